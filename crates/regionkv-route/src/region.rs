//! Cached region values.
//!
//! A `Region` is immutable once constructed. Leadership changes and peer set
//! changes produce a new value with a new generation, which is then swapped
//! into the cache through a compare-and-swap.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::selector::ReplicaSelector;
use crate::store::Store;
use crate::types::{
    format_key, next_generation, Peer, RegionDescriptor, RegionEpoch, RegionId, StoreId,
};

/// A key range with its replication group and the stores behind each peer.
#[derive(Debug, Clone)]
pub struct Region {
    descriptor: RegionDescriptor,
    leader: Peer,
    stores: HashMap<StoreId, Arc<Store>>,
    generation: u64,
}

impl Region {
    /// Creates a region from the authority's descriptor, its leader, and the
    /// resolved stores of its peers.
    ///
    /// Peers whose store could not be resolved are simply absent from `stores`.
    pub fn new(descriptor: RegionDescriptor, leader: Peer, stores: Vec<Arc<Store>>) -> Self {
        let stores = stores.into_iter().map(|s| (s.id(), s)).collect();
        Self {
            descriptor,
            leader,
            stores,
            generation: next_generation(),
        }
    }

    /// Returns the region identifier.
    pub fn id(&self) -> RegionId {
        self.descriptor.id
    }

    /// Inclusive start key; empty means the start of the keyspace.
    pub fn start_key(&self) -> &[u8] {
        &self.descriptor.start_key
    }

    /// Exclusive end key; empty means unbounded.
    pub fn end_key(&self) -> &[u8] {
        &self.descriptor.end_key
    }

    /// Returns the region epoch.
    pub fn epoch(&self) -> RegionEpoch {
        self.descriptor.epoch
    }

    /// Returns the leader peer.
    pub fn leader(&self) -> &Peer {
        &self.leader
    }

    /// All peers: leader, followers and learners, in authority order.
    pub fn peers(&self) -> &[Peer] {
        &self.descriptor.peers
    }

    /// Voting peers other than the leader.
    pub fn followers(&self) -> Vec<Peer> {
        self.descriptor
            .peers
            .iter()
            .filter(|p| !p.is_learner() && p.id != self.leader.id)
            .copied()
            .collect()
    }

    /// Non-voting peers.
    pub fn learners(&self) -> Vec<Peer> {
        self.descriptor
            .peers
            .iter()
            .filter(|p| p.is_learner())
            .copied()
            .collect()
    }

    /// Voting peers, leader included.
    pub fn voters(&self) -> Vec<Peer> {
        self.descriptor
            .peers
            .iter()
            .filter(|p| !p.is_learner())
            .copied()
            .collect()
    }

    /// Returns the peer hosted on `store_id`, if any.
    pub fn peer_by_store(&self, store_id: StoreId) -> Option<&Peer> {
        self.descriptor.peers.iter().find(|p| p.store_id == store_id)
    }

    /// Returns the resolved store for `store_id`, if it backs one of this region's peers.
    pub fn store(&self, store_id: StoreId) -> Option<&Arc<Store>> {
        self.stores.get(&store_id)
    }

    /// Resolved stores of all peers whose store is known.
    pub fn stores(&self) -> impl Iterator<Item = &Arc<Store>> {
        self.stores.values()
    }

    /// Returns the authority descriptor this region was built from.
    pub fn descriptor(&self) -> &RegionDescriptor {
        &self.descriptor
    }

    /// Returns true if `key` falls in `[start_key, end_key)`.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        key >= self.start_key() && (self.end_key().is_empty() || key < self.end_key())
    }

    /// Checks structural validity: a well-formed range and a leader that is a voting peer.
    pub fn is_valid(&self) -> bool {
        // A bounded range must hold at least one key.
        let range_ok = self.end_key().is_empty() || self.start_key() < self.end_key();
        let leader_ok = self
            .descriptor
            .peers
            .iter()
            .any(|p| *p == self.leader && !p.is_learner());
        range_ok && leader_ok
    }

    /// Returns the peer a request should target first under `selector`.
    ///
    /// Falls back to the leader when the selector yields no candidate.
    pub fn current_replica(&self, selector: ReplicaSelector) -> Peer {
        selector
            .select(&self.leader, &self.followers(), &self.learners())
            .first()
            .copied()
            .unwrap_or(self.leader)
    }

    /// Builds the successor value whose leader is the voter hosted on `store_id`.
    ///
    /// Returns `None` if no voting peer lives on that store.
    pub fn switch_peer(&self, store_id: StoreId) -> Option<Region> {
        let peer = self
            .descriptor
            .peers
            .iter()
            .find(|p| p.store_id == store_id && !p.is_learner())?;
        Some(Region {
            descriptor: self.descriptor.clone(),
            leader: *peer,
            stores: self.stores.clone(),
            generation: next_generation(),
        })
    }

    /// Returns the generation tag identifying this value.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns true if `other` is the very same region value (not merely equal contents).
    pub fn is_same(&self, other: &Region) -> bool {
        self.generation == other.generation
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "region {{id: {}, range: [{}, {}), epoch: {}, leader: {}}}",
            self.descriptor.id,
            format_key(self.start_key()),
            format_key(self.end_key()),
            self.descriptor.epoch,
            self.leader
        )
    }
}
