//! Region manager: the routing surface used by request dispatch.
//!
//! Resolves keys to `(Region, Store)` pairs through the [`RegionCache`] and
//! turns send failures reported by callers into cache invalidations and
//! compare-and-swap updates.

use std::sync::{Arc, Mutex};

use crate::authority::MetadataAuthority;
use crate::backoff::Backoffer;
use crate::cache::RegionCache;
use crate::config::RoutingConfig;
use crate::error::{AuthorityError, Result, RouteError};
use crate::event::InvalidationCallback;
use crate::health::{HealthCheckHandle, StoreHealthChecker, StoreProber};
use crate::region::Region;
use crate::selector::ReplicaSelector;
use crate::store::Store;
use crate::types::{format_key, RegionId, StoreId, StoreKind};

/// Routes keys to regions and stores for one client.
pub struct RegionManager {
    config: RoutingConfig,
    cache: Arc<RegionCache>,
    health_task: Mutex<Option<HealthCheckHandle>>,
}

impl RegionManager {
    /// Creates a manager without store health checking.
    pub fn new(
        config: RoutingConfig,
        authority: Arc<dyn MetadataAuthority>,
        on_invalidate: Option<InvalidationCallback>,
    ) -> Self {
        let mut cache = RegionCache::new(authority);
        if let Some(callback) = on_invalidate {
            cache = cache.with_invalidation_callback(callback);
        }
        Self {
            config,
            cache: Arc::new(cache),
            health_task: Mutex::new(None),
        }
    }

    /// Creates a manager that forwards through proxies and probes unreachable
    /// stores in the background.
    ///
    /// The health checker only runs if `config.enable_forwarding` is set.
    /// Must be called from within a Tokio runtime in that case.
    pub fn with_forwarding(
        config: RoutingConfig,
        authority: Arc<dyn MetadataAuthority>,
        prober: Arc<dyn StoreProber>,
        on_invalidate: Option<InvalidationCallback>,
    ) -> Self {
        if !config.enable_forwarding {
            return Self::new(config, authority, on_invalidate);
        }

        let checker = Arc::new(StoreHealthChecker::new(prober));
        let mut cache = RegionCache::new(authority).with_health_scheduler(checker.clone());
        if let Some(callback) = on_invalidate {
            cache = cache.with_invalidation_callback(callback);
        }
        let cache = Arc::new(cache);
        let handle = checker.start(cache.clone(), config.health_check_interval());

        Self {
            config,
            cache,
            health_task: Mutex::new(Some(handle)),
        }
    }

    /// Returns the routing configuration.
    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Returns the shared resolution cache.
    pub fn cache(&self) -> &Arc<RegionCache> {
        &self.cache
    }

    /// Stops background health checking. Idempotent.
    pub fn close(&self) {
        if let Ok(mut task) = self.health_task.lock() {
            if let Some(mut handle) = task.take() {
                handle.shutdown();
            }
        }
    }

    fn new_backoff(&self) -> Backoffer {
        Backoffer::new(self.config.backoff)
    }

    /// Resolves the region owning `key` with a fresh retry budget.
    pub async fn get_region_by_key(&self, key: &[u8]) -> Result<Arc<Region>> {
        let mut backoff = self.new_backoff();
        self.cache.get_region_by_key(key, &mut backoff).await
    }

    /// Resolves a region by id. Do not use when retrying a request: after a
    /// merge the id may be gone for good.
    pub async fn get_region_by_id(&self, id: RegionId) -> Result<Arc<Region>> {
        let mut backoff = self.new_backoff();
        self.cache.get_region_by_id(id, &mut backoff).await
    }

    /// Resolves a store by id. Tombstoned stores are not found.
    pub async fn get_store_by_id(&self, id: StoreId) -> Result<Arc<Store>> {
        let mut backoff = self.new_backoff();
        self.cache.get_store_by_id(id, &mut backoff).await
    }

    /// Resolves the store serving `key` for `kind`, using the configured selector.
    pub async fn resolve_store_for_key(
        &self,
        key: &[u8],
        kind: StoreKind,
    ) -> Result<(Arc<Region>, Arc<Store>)> {
        let mut backoff = self.new_backoff();
        self.get_region_store_pair(key, kind, self.config.default_selector, &mut backoff)
            .await
    }

    /// Resolves the region owning `key` and the store a request of `kind` should go to.
    ///
    /// Primary requests go to the first candidate `selector` picks. Other kinds
    /// go to the first learner whose store carries the kind's label. When no
    /// store can be found the region is invalidated, since its peer set is
    /// probably stale.
    pub async fn get_region_store_pair(
        &self,
        key: &[u8],
        kind: StoreKind,
        selector: ReplicaSelector,
        backoff: &mut Backoffer,
    ) -> Result<(Arc<Region>, Arc<Store>)> {
        let region = match self.cache.get_region_by_key(key, backoff).await {
            Ok(region) => region,
            Err(RouteError::Authority(AuthorityError::RegionNotFound)) => {
                return Err(RouteError::RegionNotFound {
                    key: format_key(key),
                    kind,
                });
            }
            Err(RouteError::InvalidRegion { region }) => {
                return Err(RouteError::InvalidRegionForKey {
                    key: format_key(key),
                    kind,
                    region,
                });
            }
            Err(e) => return Err(e),
        };

        let store = match kind.label() {
            None => {
                let peer = region.current_replica(selector);
                let store = self.find_store(peer.store_id, backoff).await?;
                if store.is_none() {
                    self.cache.invalidate_region(&region).await;
                }
                store
            }
            Some((label_key, label_value)) => {
                let mut found = None;
                for peer in region.learners() {
                    if let Some(store) = self.find_store(peer.store_id, backoff).await? {
                        if store.has_label(label_key, label_value) {
                            found = Some(store);
                            break;
                        }
                    }
                }
                if found.is_none() {
                    // The learner set may have changed; fetch it again next time.
                    self.cache.invalidate_region(&region).await;
                }
                found
            }
        };

        match store {
            Some(store) => Ok((region, store)),
            None => Err(RouteError::NoStoreForKind {
                region_id: region.id(),
                kind,
            }),
        }
    }

    /// Store lookup where "not found" is an expected outcome rather than an error.
    async fn find_store(
        &self,
        id: StoreId,
        backoff: &mut Backoffer,
    ) -> Result<Option<Arc<Store>>> {
        match self.cache.get_store_by_id(id, backoff).await {
            Ok(store) => Ok(Some(store)),
            Err(RouteError::StoreNotFound(_))
            | Err(RouteError::Authority(AuthorityError::StoreNotFound(_))) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Switches the leader of `region` to the peer on `store_id`.
    ///
    /// Returns the new region, or `None` if `region` is no longer the cached
    /// value (someone else already updated or evicted it) or has no voter on
    /// `store_id`. Callers should re-resolve on `None`.
    pub async fn update_leader(
        &self,
        region: &Region,
        store_id: StoreId,
    ) -> Option<Arc<Region>> {
        let Some(switched) = region.switch_peer(store_id) else {
            tracing::warn!(
                region_id = %region.id(),
                store_id = %store_id,
                "cannot find peer when updating leader"
            );
            return None;
        };
        let switched = Arc::new(switched);
        if self.cache.update_region(Some(region), switched.clone()).await {
            tracing::debug!(region_id = %region.id(), store_id = %store_id, "leader updated");
            return Some(switched);
        }
        tracing::warn!(
            region_id = %region.id(),
            store_id = %store_id,
            "failed to update leader; cached region is newer"
        );
        None
    }

    /// Replaces `old` with `new` if `old` is still cached.
    pub async fn update_store(&self, old: &Arc<Store>, new: Arc<Store>) -> bool {
        self.cache.update_store(old, new).await
    }

    /// Reports that a request to `region` failed at the request level.
    pub async fn on_request_fail(&self, region: &Region) -> bool {
        self.cache.invalidate_region(region).await
    }

    /// Reports that the server declared `region` stale.
    pub async fn on_region_stale(&self, region: &Region) -> bool {
        self.cache.invalidate_region(region).await
    }

    /// Drops `region` if it is still the cached value.
    pub async fn invalidate_region(&self, region: &Region) -> bool {
        self.cache.invalidate_region(region).await
    }

    /// Drops the cached store for `id`.
    pub async fn invalidate_store(&self, id: StoreId) -> bool {
        self.cache.invalidate_store(id).await
    }

    /// Evicts every region led from `store`, if `store` is still the cached value.
    pub async fn invalidate_all_regions_for_store(&self, store: &Store) -> usize {
        self.cache.invalidate_all_regions_for_store(store).await
    }

    /// Drops all cached regions after an unexpected error.
    pub async fn clear_region_cache(&self) {
        self.cache.clear_all().await;
    }
}

impl Drop for RegionManager {
    fn drop(&mut self) {
        self.close();
    }
}
