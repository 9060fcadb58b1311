//! Cached store values.
//!
//! A `Store` wraps the authority's descriptor with the two pieces of client-side
//! state that change in place: the reachability flag and, through replacement,
//! the forwarding proxy used while direct connectivity is lost.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::types::{next_generation, StoreDescriptor, StoreId, StoreLabel, StoreState};

/// A cluster node as seen by the routing cache.
#[derive(Debug)]
pub struct Store {
    descriptor: StoreDescriptor,
    reachable: AtomicBool,
    proxy_store: Option<Arc<Store>>,
    generation: u64,
}

impl Store {
    /// Creates a reachable store value from an authority descriptor.
    pub fn new(descriptor: StoreDescriptor) -> Self {
        Self {
            descriptor,
            reachable: AtomicBool::new(true),
            proxy_store: None,
            generation: next_generation(),
        }
    }

    /// Builds the replacement value that forwards traffic through `proxy`.
    pub fn with_proxy(&self, proxy: Arc<Store>) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            reachable: AtomicBool::new(self.is_reachable()),
            proxy_store: Some(proxy),
            generation: next_generation(),
        }
    }

    /// Builds the replacement value for a store whose direct connectivity came back.
    pub fn without_proxy(&self) -> Self {
        Self::new(self.descriptor.clone())
    }

    /// Returns the store identifier.
    pub fn id(&self) -> StoreId {
        self.descriptor.id
    }

    /// Returns the network address.
    pub fn address(&self) -> &str {
        &self.descriptor.address
    }

    /// Returns the store labels.
    pub fn labels(&self) -> &[StoreLabel] {
        &self.descriptor.labels
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> StoreState {
        self.descriptor.state
    }

    /// Returns the underlying authority descriptor.
    pub fn descriptor(&self) -> &StoreDescriptor {
        &self.descriptor
    }

    /// Returns true if the store was permanently removed.
    pub fn is_tombstone(&self) -> bool {
        self.descriptor.state == StoreState::Tombstone
    }

    /// Returns true if the store carries the given label.
    pub fn has_label(&self, key: &str, value: &str) -> bool {
        self.descriptor
            .labels
            .iter()
            .any(|l| l.key == key && l.value == value)
    }

    /// Returns true unless the store was judged unreachable.
    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Acquire)
    }

    /// Marks the store reachable.
    pub fn mark_reachable(&self) {
        self.reachable.store(true, Ordering::Release);
    }

    /// Marks the store unreachable.
    pub fn mark_unreachable(&self) {
        self.reachable.store(false, Ordering::Release);
    }

    /// Returns the store traffic is forwarded through, if any.
    pub fn proxy_store(&self) -> Option<&Arc<Store>> {
        self.proxy_store.as_ref()
    }

    /// Returns the generation tag assigned at construction.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns true if `other` is the very same store value (not merely equal contents).
    pub fn is_same(&self, other: &Store) -> bool {
        self.generation == other.generation
    }
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "store {{id: {}, addr: {}, state: {:?}, reachable: {}}}",
            self.descriptor.id,
            self.descriptor.address,
            self.descriptor.state,
            self.is_reachable()
        )
    }
}
