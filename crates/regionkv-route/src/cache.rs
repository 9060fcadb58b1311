//! Region and store resolution cache.
//!
//! The cache keeps three structures behind one lock: an ordered index from
//! range start key to region id, the region-id map, and the store-id map. The
//! index and the region map always describe the same set of regions.
//!
//! Mutations are either additive (populating a miss) or guarded by the
//! generation of the value the caller last observed. A caller acting on stale
//! information gets `false` back and must re-resolve.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use crate::authority::MetadataAuthority;
use crate::backoff::Backoffer;
use crate::error::{Result, RouteError};
use crate::event::{CacheInvalidateEvent, InvalidationCallback};
use crate::health::HealthCheckScheduler;
use crate::metrics::CacheMetrics;
use crate::region::Region;
use crate::store::Store;
use crate::types::{format_key, Peer, RegionDescriptor, RegionId, StoreId};

#[derive(Debug, Clone)]
struct RangeEntry {
    end_key: Vec<u8>,
    region_id: RegionId,
}

/// Everything guarded by the cache lock.
#[derive(Debug, Default)]
struct CacheState {
    /// Range start key -> (end key, region id). Empty end key means unbounded.
    key_to_region: BTreeMap<Vec<u8>, RangeEntry>,
    regions: HashMap<RegionId, Arc<Region>>,
    stores: HashMap<StoreId, Arc<Store>>,
}

impl CacheState {
    /// Finds the cached region whose range contains `key`.
    ///
    /// The empty key sorts before every other key, so it resolves to the
    /// region starting the keyspace.
    fn region_for_key(&self, key: &[u8]) -> Option<&Arc<Region>> {
        let (_, entry) = self
            .key_to_region
            .range::<[u8], _>((Bound::Unbounded, Bound::Included(key)))
            .next_back()?;
        if entry.end_key.is_empty() || key < entry.end_key.as_slice() {
            self.regions.get(&entry.region_id)
        } else {
            None
        }
    }

    /// Ids of cached regions whose range intersects `[start, end)`.
    fn overlapping(&self, start: &[u8], end: &[u8]) -> Vec<RegionId> {
        let upper = if end.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(end)
        };
        self.key_to_region
            .range::<[u8], _>((Bound::Unbounded, upper))
            .filter(|(_, e)| e.end_key.is_empty() || e.end_key.as_slice() > start)
            .map(|(_, e)| e.region_id)
            .collect()
    }

    /// Inserts `region`, evicting its previous version, any cached region
    /// whose range overlaps it, and whichever region owns its start key.
    /// Returns the evicted regions of other ids.
    fn put_region(&mut self, region: Arc<Region>) -> Vec<Arc<Region>> {
        self.remove_region(region.id());

        let mut doomed = self.overlapping(region.start_key(), region.end_key());
        // An empty range overlaps nothing but still takes over its start key.
        if let Some(owner) = self.key_to_region.get(region.start_key()) {
            if !doomed.contains(&owner.region_id) {
                doomed.push(owner.region_id);
            }
        }

        let mut evicted = Vec::new();
        for id in doomed {
            if let Some(old) = self.remove_region(id) {
                evicted.push(old);
            }
        }

        self.key_to_region.insert(
            region.start_key().to_vec(),
            RangeEntry {
                end_key: region.end_key().to_vec(),
                region_id: region.id(),
            },
        );
        self.regions.insert(region.id(), region);
        evicted
    }

    /// Removes a region from both the id map and the range index.
    fn remove_region(&mut self, id: RegionId) -> Option<Arc<Region>> {
        let region = self.regions.remove(&id)?;
        let owned = self
            .key_to_region
            .get(region.start_key())
            .is_some_and(|e| e.region_id == id);
        if owned {
            self.key_to_region.remove(region.start_key());
        }
        Some(region)
    }

    fn clear_regions(&mut self) {
        self.key_to_region.clear();
        self.regions.clear();
    }
}

/// Concurrent key -> region and id -> store resolution cache.
pub struct RegionCache {
    state: Mutex<CacheState>,
    authority: Arc<dyn MetadataAuthority>,
    health: Option<Arc<dyn HealthCheckScheduler>>,
    on_invalidate: Option<InvalidationCallback>,
    metrics: Arc<CacheMetrics>,
}

impl RegionCache {
    /// Creates an empty cache backed by `authority`.
    pub fn new(authority: Arc<dyn MetadataAuthority>) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            authority,
            health: None,
            on_invalidate: None,
            metrics: Arc::new(CacheMetrics::new()),
        }
    }

    /// Sets the collaborator notified when a store starts forwarding through a proxy.
    pub fn with_health_scheduler(mut self, scheduler: Arc<dyn HealthCheckScheduler>) -> Self {
        self.health = Some(scheduler);
        self
    }

    /// Sets the subscriber notified on every effective invalidation.
    pub fn with_invalidation_callback(mut self, callback: InvalidationCallback) -> Self {
        self.on_invalidate = Some(callback);
        self
    }

    /// Returns the metadata authority backing this cache.
    pub fn authority(&self) -> &Arc<dyn MetadataAuthority> {
        &self.authority
    }

    /// Returns the cache counters.
    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }

    /// Resolves the region owning `key`.
    ///
    /// A hit returns the cached value without any staleness check. A miss asks
    /// the authority while holding the cache lock, so concurrent callers for
    /// the same key wait for the first fetch instead of issuing their own.
    pub async fn get_region_by_key(
        &self,
        key: &[u8],
        backoff: &mut Backoffer,
    ) -> Result<Arc<Region>> {
        self.metrics.inc_region_lookups();
        let mut state = self.state.lock().await;

        if let Some(region) = state.region_for_key(key) {
            self.metrics.inc_region_hits();
            tracing::trace!(key = %format_key(key), region_id = %region.id(), "region cache hit");
            return Ok(region.clone());
        }

        self.metrics.inc_region_misses();
        tracing::debug!(key = %format_key(key), "key not found in region cache");
        let started = Instant::now();

        self.metrics.inc_authority_region_fetches();
        let (descriptor, leader) = self.authority.get_region_by_key(backoff, key).await?;
        let region = self
            .create_region(&mut state, descriptor, leader, backoff)
            .await?;
        let (region, evicted) = self.insert_region(&mut state, region)?;
        drop(state);

        self.metrics.record_miss_latency(started.elapsed());
        self.notify_evicted(&evicted);
        Ok(region)
    }

    /// Resolves a region by id.
    ///
    /// Not suitable for retrying a failed request: after a merge the id may no
    /// longer exist while its keys live on in another region. Retry by key.
    pub async fn get_region_by_id(
        &self,
        id: RegionId,
        backoff: &mut Backoffer,
    ) -> Result<Arc<Region>> {
        let mut state = self.state.lock().await;
        if let Some(region) = state.regions.get(&id) {
            return Ok(region.clone());
        }

        self.metrics.inc_authority_region_fetches();
        let (descriptor, leader) = self.authority.get_region_by_id(backoff, id).await?;
        let region = self
            .create_region(&mut state, descriptor, leader, backoff)
            .await?;
        let (region, evicted) = self.insert_region(&mut state, region)?;
        drop(state);

        self.notify_evicted(&evicted);
        Ok(region)
    }

    /// Resolves a store by id. Tombstoned stores are reported as not found.
    pub async fn get_store_by_id(
        &self,
        id: StoreId,
        backoff: &mut Backoffer,
    ) -> Result<Arc<Store>> {
        let mut state = self.state.lock().await;
        self.load_store(&mut state, id, backoff)
            .await?
            .ok_or(RouteError::StoreNotFound(id))
    }

    /// Returns the cached store, fetching and caching it on a miss.
    ///
    /// `Ok(None)` means the store is tombstoned; such stores are never cached.
    async fn load_store(
        &self,
        state: &mut CacheState,
        id: StoreId,
        backoff: &mut Backoffer,
    ) -> Result<Option<Arc<Store>>> {
        if let Some(store) = state.stores.get(&id) {
            if store.is_tombstone() {
                return Ok(None);
            }
            return Ok(Some(store.clone()));
        }

        self.metrics.inc_authority_store_fetches();
        let descriptor = self.authority.get_store(backoff, id).await?;
        let store = Store::new(descriptor);
        if store.is_tombstone() {
            tracing::debug!(store_id = %id, "store is tombstoned; not caching");
            return Ok(None);
        }

        let store = Arc::new(store);
        state.stores.insert(id, store.clone());
        Ok(Some(store))
    }

    async fn create_region(
        &self,
        state: &mut CacheState,
        descriptor: RegionDescriptor,
        leader: Peer,
        backoff: &mut Backoffer,
    ) -> Result<Region> {
        let mut stores = Vec::with_capacity(descriptor.peers.len());
        for peer in &descriptor.peers {
            if let Some(store) = self.load_store(state, peer.store_id, backoff).await? {
                stores.push(store);
            }
        }
        Ok(Region::new(descriptor, leader, stores))
    }

    fn insert_region(
        &self,
        state: &mut CacheState,
        region: Region,
    ) -> Result<(Arc<Region>, Vec<Arc<Region>>)> {
        if !region.is_valid() {
            return Err(RouteError::InvalidRegion {
                region: region.to_string(),
            });
        }

        tracing::debug!(region = %region, "put region");
        let region = Arc::new(region);
        let evicted = state.put_region(region.clone());
        Ok((region, evicted))
    }

    /// Drops `region` if it is still the cached value for its id.
    ///
    /// Returns false, changing nothing, if the cache already holds a newer
    /// value or no value for that id.
    pub async fn invalidate_region(&self, region: &Region) -> bool {
        let mut state = self.state.lock().await;
        let current = state
            .regions
            .get(&region.id())
            .is_some_and(|cached| cached.is_same(region));
        if !current {
            return false;
        }
        state.remove_region(region.id());
        drop(state);

        tracing::debug!(region_id = %region.id(), "invalidate region");
        self.metrics.add_regions_invalidated(1);
        self.notify(CacheInvalidateEvent::region(region.id()));
        true
    }

    /// Replaces the cached region for `replacement.id()` if it is still `expected`.
    ///
    /// `expected = None` asserts that no region is cached for that id.
    pub async fn update_region(&self, expected: Option<&Region>, replacement: Arc<Region>) -> bool {
        if !replacement.is_valid() {
            tracing::warn!(region = %replacement, "refusing to cache invalid region");
            return false;
        }

        let mut state = self.state.lock().await;
        let matches = match (state.regions.get(&replacement.id()), expected) {
            (Some(cached), Some(expected)) => cached.is_same(expected),
            (None, None) => true,
            _ => false,
        };
        self.metrics.record_cas(matches);
        if !matches {
            tracing::debug!(region_id = %replacement.id(), "stale region update rejected");
            return false;
        }

        tracing::debug!(region = %replacement, "update region");
        let evicted = state.put_region(replacement);
        drop(state);

        self.notify_evicted(&evicted);
        true
    }

    /// Replaces the cached store for `old.id()` if it is still `old`.
    ///
    /// On success a previously unreachable `old` is marked reachable again,
    /// and a `new` value carrying a proxy is marked unreachable and handed to
    /// the health-check scheduler.
    pub async fn update_store(&self, old: &Arc<Store>, new: Arc<Store>) -> bool {
        let mut state = self.state.lock().await;
        let matches = state
            .stores
            .get(&old.id())
            .is_some_and(|cached| cached.is_same(old));
        self.metrics.record_cas(matches);
        if !matches {
            tracing::debug!(store_id = %old.id(), "stale store update rejected");
            return false;
        }

        state.stores.insert(new.id(), new.clone());
        if !old.is_reachable() {
            old.mark_reachable();
        }
        if new.proxy_store().is_some() {
            new.mark_unreachable();
            if let Some(scheduler) = &self.health {
                tracing::warn!(
                    store_id = %new.id(),
                    address = %new.address(),
                    "store forwarding through proxy; checking health in background"
                );
                scheduler.schedule_health_check(new.clone());
            }
        }
        true
    }

    /// Evicts every cached region led from `store`, if `store` is still the cached value.
    ///
    /// Returns the number of regions evicted.
    pub async fn invalidate_all_regions_for_store(&self, store: &Store) -> usize {
        let mut state = self.state.lock().await;
        let current = state
            .stores
            .get(&store.id())
            .is_some_and(|cached| cached.is_same(store));
        if !current {
            return 0;
        }

        let to_remove: Vec<RegionId> = state
            .regions
            .values()
            .filter(|r| r.leader().store_id == store.id())
            .map(|r| r.id())
            .collect();
        for id in &to_remove {
            state.remove_region(*id);
        }
        drop(state);

        tracing::warn!(store_id = %store.id(), regions = to_remove.len(), "invalidate store");
        self.metrics.add_regions_invalidated(to_remove.len() as u64);
        for id in &to_remove {
            self.notify(CacheInvalidateEvent::region_store(*id, store.id()));
        }
        to_remove.len()
    }

    /// Removes a store by id, marking the removed value reachable.
    pub async fn invalidate_store(&self, id: StoreId) -> bool {
        let removed = self.state.lock().await.stores.remove(&id);
        match removed {
            Some(store) => {
                store.mark_reachable();
                tracing::debug!(store_id = %id, "invalidate store");
                self.metrics.inc_stores_invalidated();
                self.notify(CacheInvalidateEvent::store(id));
                true
            }
            None => false,
        }
    }

    /// Drops every cached region. Stores are kept.
    pub async fn clear_all(&self) {
        let dropped = {
            let mut state = self.state.lock().await;
            let n = state.regions.len();
            state.clear_regions();
            n
        };
        tracing::debug!(regions = dropped, "clear region cache");
        self.metrics.add_regions_invalidated(dropped as u64);
        self.notify(CacheInvalidateEvent::all());
    }

    /// Number of cached regions.
    pub async fn region_count(&self) -> usize {
        self.state.lock().await.regions.len()
    }

    /// Number of cached stores.
    pub async fn store_count(&self) -> usize {
        self.state.lock().await.stores.len()
    }

    /// Returns the cached region for `id` without contacting the authority.
    pub async fn cached_region(&self, id: RegionId) -> Option<Arc<Region>> {
        self.state.lock().await.regions.get(&id).cloned()
    }

    /// Returns the cached store for `id` without contacting the authority.
    pub async fn cached_store(&self, id: StoreId) -> Option<Arc<Store>> {
        self.state.lock().await.stores.get(&id).cloned()
    }

    fn notify(&self, event: CacheInvalidateEvent) {
        if let Some(callback) = &self.on_invalidate {
            callback(event);
        }
    }

    fn notify_evicted(&self, evicted: &[Arc<Region>]) {
        if evicted.is_empty() {
            return;
        }
        self.metrics.add_regions_invalidated(evicted.len() as u64);
        for region in evicted {
            tracing::debug!(region = %region, "evicted overlapping region");
            self.notify(CacheInvalidateEvent::region(region.id()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::MetadataAuthority;
    use crate::error::AuthorityError;
    use crate::types::{StoreDescriptor, StoreState};
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex as StdMutex;

    /// Authority serving a fixed set of regions and stores.
    #[derive(Default)]
    struct FixedAuthority {
        regions: StdMutex<Vec<(RegionDescriptor, Peer)>>,
        stores: StdMutex<HashMap<StoreId, StoreDescriptor>>,
        region_calls: AtomicU64,
        store_calls: AtomicU64,
    }

    impl FixedAuthority {
        fn add_region(&self, desc: RegionDescriptor, leader: Peer) {
            self.regions.lock().unwrap().push((desc, leader));
        }

        fn add_store(&self, desc: StoreDescriptor) {
            self.stores.lock().unwrap().insert(desc.id, desc);
        }
    }

    #[async_trait]
    impl MetadataAuthority for FixedAuthority {
        async fn get_region_by_key(
            &self,
            _backoff: &mut Backoffer,
            key: &[u8],
        ) -> Result<(RegionDescriptor, Peer)> {
            self.region_calls.fetch_add(1, Ordering::SeqCst);
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
            self.regions
                .lock()
                .unwrap()
                .iter()
                .find(|(d, _)| d.id == id)
                .cloned()
                .ok_or(RouteError::Authority(AuthorityError::RegionNotFound))
        }

        async fn get_store(
            &self,
            _backoff: &mut Backoffer,
            id: StoreId,
        ) -> Result<StoreDescriptor> {
            self.store_calls.fetch_add(1, Ordering::SeqCst);
            self.stores
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .ok_or(RouteError::Authority(AuthorityError::StoreNotFound(id)))
        }
    }

    fn setup() -> (Arc<FixedAuthority>, RegionCache) {
        let authority = Arc::new(FixedAuthority::default());
        for id in [10, 20, 30] {
            authority.add_store(StoreDescriptor::new(id, format!("10.0.0.{}:20160", id)));
        }
        authority.add_region(
            RegionDescriptor::new(1, "a", "m", vec![Peer::voter(11, 10), Peer::voter(12, 20)]),
            Peer::voter(11, 10),
        );
        authority.add_region(
            RegionDescriptor::new(2, "m", "", vec![Peer::voter(21, 20), Peer::voter(22, 30)]),
            Peer::voter(21, 20),
        );
        let cache = RegionCache::new(authority.clone());
        (authority, cache)
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let (authority, cache) = setup();
        let mut bo = Backoffer::get_backoff();

        let first = cache.get_region_by_key(b"c", &mut bo).await.unwrap();
        assert_eq!(first.id(), RegionId::new(1));
        assert_eq!(authority.region_calls.load(Ordering::SeqCst), 1);

        let second = cache.get_region_by_key(b"k", &mut bo).await.unwrap();
        assert!(second.is_same(&first));
        assert_eq!(authority.region_calls.load(Ordering::SeqCst), 1);

        let snap = cache.metrics().snapshot();
        assert_eq!(snap.region_hits, 1);
        assert_eq!(snap.region_misses, 1);
    }

    #[tokio::test]
    async fn test_end_key_is_exclusive() {
        let (authority, cache) = setup();
        let mut bo = Backoffer::get_backoff();

        cache.get_region_by_key(b"a", &mut bo).await.unwrap();
        let region = cache.get_region_by_key(b"m", &mut bo).await.unwrap();
        assert_eq!(region.id(), RegionId::new(2));
        assert_eq!(authority.region_calls.load(Ordering::SeqCst), 2);

        let tail = cache.get_region_by_key(b"zzzz", &mut bo).await.unwrap();
        assert_eq!(tail.id(), RegionId::new(2));
        assert_eq!(authority.region_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stores_populated_once() {
        let (authority, cache) = setup();
        let mut bo = Backoffer::get_backoff();

        cache.get_region_by_key(b"b", &mut bo).await.unwrap();
        cache.get_region_by_key(b"x", &mut bo).await.unwrap();
        // Stores 10, 20, 30; store 20 is shared and fetched once.
        assert_eq!(authority.store_calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.store_count().await, 3);
    }

    #[tokio::test]
    async fn test_invalid_region_not_inserted() {
        let authority = Arc::new(FixedAuthority::default());
        authority.add_store(StoreDescriptor::new(10, "s10"));
        authority.add_region(
            RegionDescriptor::new(7, "a", "z", vec![Peer::voter(1, 10)]),
            Peer::voter(99, 99),
        );
        let cache = RegionCache::new(authority);
        let mut bo = Backoffer::get_backoff();

        let err = cache.get_region_by_key(b"b", &mut bo).await.unwrap_err();
        assert!(matches!(err, RouteError::InvalidRegion { .. }));
        assert_eq!(cache.region_count().await, 0);
    }

    #[tokio::test]
    async fn test_tombstone_store_not_cached() {
        let (authority, cache) = setup();
        authority.add_store(StoreDescriptor::new(40, "s40").with_state(StoreState::Tombstone));
        let mut bo = Backoffer::get_backoff();

        let err = cache.get_store_by_id(StoreId::new(40), &mut bo).await.unwrap_err();
        assert!(matches!(err, RouteError::StoreNotFound(id) if id == StoreId::new(40)));
        assert!(cache.cached_store(StoreId::new(40)).await.is_none());

        // A second lookup asks the authority again.
        let _ = cache.get_store_by_id(StoreId::new(40), &mut bo).await;
        assert_eq!(authority.store_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_region_identity_guard() {
        let (_, cache) = setup();
        let mut bo = Backoffer::get_backoff();
        let old = cache.get_region_by_key(b"c", &mut bo).await.unwrap();

        let newer = Arc::new(old.switch_peer(StoreId::new(20)).unwrap());
        assert!(cache.update_region(Some(&old), newer.clone()).await);

        assert!(!cache.invalidate_region(&old).await);
        let cached = cache.cached_region(RegionId::new(1)).await.unwrap();
        assert!(cached.is_same(&newer));

        assert!(cache.invalidate_region(&newer).await);
        assert!(cache.cached_region(RegionId::new(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_update_region_cas() {
        let (_, cache) = setup();
        let mut bo = Backoffer::get_backoff();
        let old = cache.get_region_by_key(b"c", &mut bo).await.unwrap();

        let a = Arc::new(old.switch_peer(StoreId::new(20)).unwrap());
        let b = Arc::new(old.switch_peer(StoreId::new(10)).unwrap());
        assert!(cache.update_region(Some(&old), a.clone()).await);
        assert!(!cache.update_region(Some(&old), b).await);

        let cached = cache.get_region_by_key(b"c", &mut bo).await.unwrap();
        assert!(cached.is_same(&a));
        assert_eq!(cache.metrics().snapshot().cas_rejected, 1);
    }

    #[tokio::test]
    async fn test_update_region_expected_absent() {
        let (_, cache) = setup();
        let region = Arc::new(Region::new(
            RegionDescriptor::new(5, "p", "q", vec![Peer::voter(1, 10)]),
            Peer::voter(1, 10),
            vec![],
        ));
        assert!(cache.update_region(None, region.clone()).await);
        assert!(!cache.update_region(None, region).await);
        assert_eq!(cache.region_count().await, 1);
    }

    #[tokio::test]
    async fn test_overlapping_insert_evicts() {
        let (_, cache) = setup();
        let mut bo = Backoffer::get_backoff();
        cache.get_region_by_key(b"c", &mut bo).await.unwrap();
        cache.get_region_by_key(b"x", &mut bo).await.unwrap();

        // A merged region covering the whole keyspace replaces both.
        let merged = Arc::new(Region::new(
            RegionDescriptor::new(3, "", "", vec![Peer::voter(31, 10)]),
            Peer::voter(31, 10),
            vec![],
        ));
        assert!(cache.update_region(None, merged.clone()).await);
        assert_eq!(cache.region_count().await, 1);

        let found = cache.get_region_by_key(b"c", &mut bo).await.unwrap();
        assert!(found.is_same(&merged));
    }

    #[tokio::test]
    async fn test_empty_key_resolves_first_region() {
        let authority = Arc::new(FixedAuthority::default());
        authority.add_store(StoreDescriptor::new(10, "s10"));
        authority.add_region(
            RegionDescriptor::new(1, "", "k", vec![Peer::voter(1, 10)]),
            Peer::voter(1, 10),
        );
        let cache = RegionCache::new(authority.clone());
        let mut bo = Backoffer::get_backoff();

        let region = cache.get_region_by_key(b"", &mut bo).await.unwrap();
        assert_eq!(region.id(), RegionId::new(1));
        let again = cache.get_region_by_key(b"", &mut bo).await.unwrap();
        assert!(again.is_same(&region));
        assert_eq!(authority.region_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_region_by_id() {
        let (authority, cache) = setup();
        let mut bo = Backoffer::get_backoff();

        let region = cache.get_region_by_id(RegionId::new(2), &mut bo).await.unwrap();
        assert_eq!(region.start_key(), b"m");
        let by_key = cache.get_region_by_key(b"q", &mut bo).await.unwrap();
        assert!(by_key.is_same(&region));
        assert_eq!(authority.region_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_update_store_cas_and_reachability() {
        let (_, cache) = setup();
        let mut bo = Backoffer::get_backoff();
        let old = cache.get_store_by_id(StoreId::new(10), &mut bo).await.unwrap();
        old.mark_unreachable();

        let fresh = Arc::new(old.without_proxy());
        assert!(cache.update_store(&old, fresh.clone()).await);
        assert!(old.is_reachable());
        assert!(fresh.is_reachable());

        // `old` is no longer cached.
        assert!(!cache.update_store(&old, Arc::new(old.without_proxy())).await);
        let cached = cache.cached_store(StoreId::new(10)).await.unwrap();
        assert!(cached.is_same(&fresh));
    }

    #[tokio::test]
    async fn test_invalidate_store_marks_reachable() {
        let (_, cache) = setup();
        let mut bo = Backoffer::get_backoff();
        let store = cache.get_store_by_id(StoreId::new(20), &mut bo).await.unwrap();
        store.mark_unreachable();

        assert!(cache.invalidate_store(StoreId::new(20)).await);
        assert!(store.is_reachable());
        assert!(!cache.invalidate_store(StoreId::new(20)).await);
    }

    #[tokio::test]
    async fn test_clear_all_keeps_stores() {
        let (authority, cache) = setup();
        let mut bo = Backoffer::get_backoff();
        cache.get_region_by_key(b"c", &mut bo).await.unwrap();
        cache.clear_all().await;

        assert_eq!(cache.region_count().await, 0);
        assert_eq!(cache.store_count().await, 2);
        cache.get_region_by_key(b"c", &mut bo).await.unwrap();
        assert_eq!(authority.region_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_state_overlap_detection() {
        let mut state = CacheState::default();
        let region = |id: u64, s: &str, e: &str| {
            Arc::new(Region::new(
                RegionDescriptor::new(id, s, e, vec![Peer::voter(id, 1)]),
                Peer::voter(id, 1),
                vec![],
            ))
        };
        state.put_region(region(1, "a", "c"));
        state.put_region(region(2, "c", "f"));
        state.put_region(region(3, "f", ""));

        assert_eq!(state.overlapping(b"b", b"d").len(), 2);
        assert_eq!(state.overlapping(b"c", b"f"), vec![RegionId::new(2)]);
        assert_eq!(state.overlapping(b"x", b"").len(), 1);
        assert!(state.overlapping(b"", b"a").is_empty());
        assert!(state.region_for_key(b"0").is_none());
        assert_eq!(state.region_for_key(b"e").unwrap().id(), RegionId::new(2));
    }

    fn state_region(id: u64, start: &[u8], end: &[u8]) -> Arc<Region> {
        Arc::new(Region::new(
            RegionDescriptor::new(id, start.to_vec(), end.to_vec(), vec![Peer::voter(id, 1)]),
            Peer::voter(id, 1),
            vec![],
        ))
    }

    /// Every cached region has exactly one index entry and vice versa.
    fn assert_index_consistent(state: &CacheState) {
        assert_eq!(state.regions.len(), state.key_to_region.len());
        for (start, entry) in &state.key_to_region {
            let region = state
                .regions
                .get(&entry.region_id)
                .expect("indexed region is cached");
            assert_eq!(region.start_key(), start.as_slice());
            assert_eq!(region.end_key(), entry.end_key.as_slice());
            if region.contains_key(start) {
                let found = state.region_for_key(start).expect("start key resolves");
                assert!(found.is_same(region));
            }
        }
    }

    #[test]
    fn test_empty_range_takes_over_start_key() {
        let mut state = CacheState::default();
        state.put_region(state_region(1, b"a", b"m"));

        let evicted = state.put_region(state_region(5, b"a", b"a"));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id(), RegionId::new(1));
        assert_index_consistent(&state);
        assert!(state.region_for_key(b"c").is_none());

        assert!(state.remove_region(RegionId::new(5)).is_some());
        assert!(state.key_to_region.is_empty());
    }

    #[tokio::test]
    async fn test_update_region_rejects_empty_range() {
        let (_, cache) = setup();
        let mut bo = Backoffer::get_backoff();
        let cached = cache.get_region_by_key(b"c", &mut bo).await.unwrap();

        let empty = Arc::new(Region::new(
            RegionDescriptor::new(5, "a", "a", vec![Peer::voter(1, 10)]),
            Peer::voter(1, 10),
            vec![],
        ));
        assert!(!cache.update_region(None, empty).await);

        let again = cache.get_region_by_key(b"c", &mut bo).await.unwrap();
        assert!(again.is_same(&cached));
        assert_eq!(cache.region_count().await, 1);
    }

    /// (remove?, region id, start byte, end offset; `None` = unbounded)
    fn any_op() -> impl Strategy<Value = (bool, u64, u8, Option<u8>)> {
        (any::<bool>(), 1u64..8, b'a'..b'k', proptest::option::of(0u8..4))
    }

    proptest! {
        #[test]
        fn prop_index_matches_region_map(ops in proptest::collection::vec(any_op(), 1..40)) {
            let mut state = CacheState::default();
            for (remove, id, start, len) in ops {
                if remove {
                    state.remove_region(RegionId::new(id));
                } else {
                    let end = len.map(|l| vec![start + l]).unwrap_or_default();
                    state.put_region(state_region(id, &[start], &end));
                }
                assert_index_consistent(&state);
            }
        }
    }
}
