//! Background health checking for stores reached through a forwarding proxy.
//!
//! When the cache installs a store value that carries a proxy, it hands that
//! value to a [`HealthCheckScheduler`]. The [`StoreHealthChecker`] probes each
//! scheduled store on a fixed period and, once a store answers directly,
//! installs a proxy-free replacement through [`RegionCache::update_store`],
//! the same compare-and-swap entry point the request path uses.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::backoff::Backoffer;
use crate::cache::RegionCache;
use crate::store::Store;
use crate::types::{StoreId, StoreState};

/// Receives stores that need background reachability checks.
pub trait HealthCheckScheduler: Send + Sync {
    /// Queues `store` for probing. Must not block.
    fn schedule_health_check(&self, store: Arc<Store>);
}

/// Checks whether a store answers on its own address.
#[async_trait]
pub trait StoreProber: Send + Sync + 'static {
    /// Returns true if `store` answered directly.
    async fn probe(&self, store: &Store) -> bool;
}

/// Outcome of one probing round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthCheckRound {
    /// Stores that answered and were swapped for a proxy-free value.
    pub recovered: usize,
    /// Stores the authority reports as tombstoned; removed from the cache.
    pub removed: usize,
    /// Stores dropped because the cache no longer holds the probed value.
    pub stale: usize,
    /// Stores still unreachable, kept for the next round.
    pub retained: usize,
}

/// Periodic prober for unreachable stores.
pub struct StoreHealthChecker {
    prober: Arc<dyn StoreProber>,
    pending: Mutex<HashMap<StoreId, Arc<Store>>>,
}

impl StoreHealthChecker {
    /// Creates a checker with an empty queue.
    pub fn new(prober: Arc<dyn StoreProber>) -> Self {
        Self {
            prober,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Number of stores waiting for a probe.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Probes every scheduled store once.
    pub async fn run_once(&self, cache: &RegionCache) -> HealthCheckRound {
        let batch: Vec<Arc<Store>> = match self.pending.lock() {
            Ok(mut pending) => pending.drain().map(|(_, s)| s).collect(),
            Err(_) => return HealthCheckRound::default(),
        };

        let mut round = HealthCheckRound::default();
        let mut keep = Vec::new();
        for store in batch {
            let current = cache
                .cached_store(store.id())
                .await
                .is_some_and(|cached| cached.is_same(&store));
            if !current {
                round.stale += 1;
                continue;
            }

            let mut backoff = Backoffer::get_backoff();
            match cache.authority().get_store(&mut backoff, store.id()).await {
                Ok(desc) if desc.state == StoreState::Tombstone => {
                    tracing::info!(store_id = %store.id(), "store tombstoned; dropping from cache");
                    cache.invalidate_all_regions_for_store(&store).await;
                    cache.invalidate_store(store.id()).await;
                    round.removed += 1;
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        store_id = %store.id(),
                        error = %e,
                        "failed to refresh store metadata"
                    );
                    keep.push(store);
                    continue;
                }
            }

            if self.prober.probe(&store).await {
                let recovered = Arc::new(store.without_proxy());
                if cache.update_store(&store, recovered).await {
                    tracing::info!(
                        store_id = %store.id(),
                        address = %store.address(),
                        "store reachable again"
                    );
                    round.recovered += 1;
                } else {
                    round.stale += 1;
                }
            } else {
                keep.push(store);
            }
        }

        round.retained = keep.len();
        if let Ok(mut pending) = self.pending.lock() {
            for store in keep {
                // A value scheduled during this round is newer; keep it.
                pending.entry(store.id()).or_insert(store);
            }
        }
        round
    }

    /// Spawns the periodic probing task. The first round runs one `interval` after start.
    pub fn start(
        self: &Arc<Self>,
        cache: Arc<RegionCache>,
        interval: Duration,
    ) -> HealthCheckHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let checker = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            tracing::info!(
                interval_ms = interval.as_millis() as u64,
                "store health checker started"
            );
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let round = checker.run_once(&cache).await;
                        if round != HealthCheckRound::default() {
                            tracing::debug!(?round, "store health check round");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("store health checker stopped");
        });

        HealthCheckHandle {
            shutdown_tx,
            task: Some(task),
        }
    }
}

impl HealthCheckScheduler for StoreHealthChecker {
    fn schedule_health_check(&self, store: Arc<Store>) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(store.id(), store);
        }
    }
}

/// Handle to the running health-check task. Dropping it stops the task.
pub struct HealthCheckHandle {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl HealthCheckHandle {
    /// Stops the background task. Idempotent.
    pub fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Returns true while the task has not finished.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for HealthCheckHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
