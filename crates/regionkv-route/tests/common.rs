//! Common test utilities and fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use regionkv_route::{
    AuthorityError, Backoffer, CacheInvalidateEvent, HealthCheckScheduler, InvalidationCallback,
    MetadataAuthority, Peer, RegionDescriptor, RegionId, Result, RouteError, Store,
    StoreDescriptor, StoreId, StoreProber,
};

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-memory metadata authority with call counters.
#[derive(Default)]
pub struct ScriptedAuthority {
    regions: Mutex<Vec<(RegionDescriptor, Peer)>>,
    stores: Mutex<HashMap<StoreId, StoreDescriptor>>,
    delay: Mutex<Option<Duration>>,
    pub region_calls: AtomicUsize,
    pub store_calls: AtomicUsize,
}

impl ScriptedAuthority {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_store(&self, desc: StoreDescriptor) {
        self.stores.lock().unwrap().insert(desc.id, desc);
    }

    pub fn add_region(&self, desc: RegionDescriptor, leader: Peer) {
        let mut regions = self.regions.lock().unwrap();
        regions.retain(|(d, _)| d.id != desc.id);
        regions.push((desc, leader));
    }

    /// Moves the authority's view of a region's leader.
    pub fn set_leader(&self, id: RegionId, leader: Peer) {
        let mut regions = self.regions.lock().unwrap();
        if let Some(entry) = regions.iter_mut().find(|(d, _)| d.id == id) {
            entry.1 = leader;
        }
    }

    /// Makes every region lookup sleep before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn region_calls(&self) -> usize {
        self.region_calls.load(Ordering::SeqCst)
    }

    pub fn store_calls(&self) -> usize {
        self.store_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl MetadataAuthority for ScriptedAuthority {
    async fn get_region_by_key(
        &self,
        _backoff: &mut Backoffer,
        key: &[u8],
    ) -> Result<(RegionDescriptor, Peer)> {
        self.region_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.regions
            .lock()
            .unwrap()
            .iter()
            .find(|(d, _)| {
                key >= d.start_key.as_slice()
                    && (d.end_key.is_empty() || key < d.end_key.as_slice())
            })
            .cloned()
            .ok_or(RouteError::Authority(AuthorityError::RegionNotFound))
    }

    async fn get_region_by_id(
        &self,
        _backoff: &mut Backoffer,
        id: RegionId,
    ) -> Result<(RegionDescriptor, Peer)> {
        self.region_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.regions
            .lock()
            .unwrap()
            .iter()
            .find(|(d, _)| d.id == id)
            .cloned()
            .ok_or(RouteError::Authority(AuthorityError::RegionNotFound))
    }

    async fn get_store(&self, _backoff: &mut Backoffer, id: StoreId) -> Result<StoreDescriptor> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        self.stores
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(RouteError::Authority(AuthorityError::StoreNotFound(id)))
    }
}

/// Health-check scheduler that only records what it was given.
#[derive(Default)]
pub struct RecordingScheduler {
    scheduled: Mutex<Vec<Arc<Store>>>,
}

impl RecordingScheduler {
    pub fn scheduled(&self) -> Vec<Arc<Store>> {
        self.scheduled.lock().unwrap().clone()
    }
}

impl HealthCheckScheduler for RecordingScheduler {
    fn schedule_health_check(&self, store: Arc<Store>) {
        self.scheduled.lock().unwrap().push(store);
    }
}

/// Prober whose answer is flipped by the test.
#[derive(Default)]
pub struct ToggleProber {
    pub up: AtomicBool,
}

#[async_trait]
impl StoreProber for ToggleProber {
    async fn probe(&self, _store: &Store) -> bool {
        self.up.load(Ordering::SeqCst)
    }
}

/// Collects invalidation events.
pub fn event_recorder() -> (InvalidationCallback, Arc<Mutex<Vec<CacheInvalidateEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let callback: InvalidationCallback = Arc::new(move |event: CacheInvalidateEvent| {
        sink.lock().unwrap().push(event);
    });
    (callback, events)
}

/// Three stores (10, 20, 30) at `10.0.0.<id>:20160`.
pub fn three_stores(authority: &ScriptedAuthority) {
    for id in [10u64, 20, 30] {
        authority.add_store(StoreDescriptor::new(id, format!("10.0.0.{}:20160", id)));
    }
}
