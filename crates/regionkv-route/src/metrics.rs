//! Routing cache metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
/// Snapshot of routing cache metrics at a point in time.
pub struct CacheMetricsSnapshot {
    /// Region lookups by key.
    pub region_lookups: u64,
    /// Lookups served from the cache.
    pub region_hits: u64,
    /// Lookups that went to the metadata authority.
    pub region_misses: u64,
    /// Region fetches issued to the metadata authority.
    pub authority_region_fetches: u64,
    /// Store fetches issued to the metadata authority.
    pub authority_store_fetches: u64,
    /// Regions removed by invalidation.
    pub regions_invalidated: u64,
    /// Stores removed by invalidation.
    pub stores_invalidated: u64,
    /// Compare-and-swap updates that applied.
    pub cas_applied: u64,
    /// Compare-and-swap updates rejected as stale.
    pub cas_rejected: u64,
    /// Total time spent resolving misses, in microseconds.
    pub miss_latency_total_us: u64,
    /// Slowest miss resolution, in microseconds.
    pub miss_latency_max_us: u64,
}

/// Thread-safe routing cache metrics collector.
pub struct CacheMetrics {
    region_lookups: AtomicU64,
    region_hits: AtomicU64,
    region_misses: AtomicU64,
    authority_region_fetches: AtomicU64,
    authority_store_fetches: AtomicU64,
    regions_invalidated: AtomicU64,
    stores_invalidated: AtomicU64,
    cas_applied: AtomicU64,
    cas_rejected: AtomicU64,
    miss_latency_total_us: AtomicU64,
    miss_latency_max_us: AtomicU64,
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CacheMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheMetrics")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl CacheMetrics {
    /// Creates a new CacheMetrics instance with all counters initialized to zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            region_lookups: AtomicU64::new(0),
            region_hits: AtomicU64::new(0),
            region_misses: AtomicU64::new(0),
            authority_region_fetches: AtomicU64::new(0),
            authority_store_fetches: AtomicU64::new(0),
            regions_invalidated: AtomicU64::new(0),
            stores_invalidated: AtomicU64::new(0),
            cas_applied: AtomicU64::new(0),
            cas_rejected: AtomicU64::new(0),
            miss_latency_total_us: AtomicU64::new(0),
            miss_latency_max_us: AtomicU64::new(0),
        }
    }

    /// Increments the region lookup counter.
    pub fn inc_region_lookups(&self) {
        self.region_lookups.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the cache hit counter.
    pub fn inc_region_hits(&self) {
        self.region_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the cache miss counter.
    pub fn inc_region_misses(&self) {
        self.region_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the authority region fetch counter.
    pub fn inc_authority_region_fetches(&self) {
        self.authority_region_fetches.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the authority store fetch counter.
    pub fn inc_authority_store_fetches(&self) {
        self.authority_store_fetches.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds to the invalidated regions counter.
    pub fn add_regions_invalidated(&self, count: u64) {
        self.regions_invalidated.fetch_add(count, Ordering::Relaxed);
    }

    /// Increments the invalidated stores counter.
    pub fn inc_stores_invalidated(&self) {
        self.stores_invalidated.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the outcome of one compare-and-swap update.
    pub fn record_cas(&self, applied: bool) {
        if applied {
            self.cas_applied.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cas_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records how long one miss took to resolve.
    pub fn record_miss_latency(&self, elapsed: Duration) {
        let us = elapsed.as_micros() as u64;
        self.miss_latency_total_us.fetch_add(us, Ordering::Relaxed);
        self.miss_latency_max_us.fetch_max(us, Ordering::Relaxed);
    }

    /// Returns a snapshot of all current metric values.
    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            region_lookups: self.region_lookups.load(Ordering::Relaxed),
            region_hits: self.region_hits.load(Ordering::Relaxed),
            region_misses: self.region_misses.load(Ordering::Relaxed),
            authority_region_fetches: self.authority_region_fetches.load(Ordering::Relaxed),
            authority_store_fetches: self.authority_store_fetches.load(Ordering::Relaxed),
            regions_invalidated: self.regions_invalidated.load(Ordering::Relaxed),
            stores_invalidated: self.stores_invalidated.load(Ordering::Relaxed),
            cas_applied: self.cas_applied.load(Ordering::Relaxed),
            cas_rejected: self.cas_rejected.load(Ordering::Relaxed),
            miss_latency_total_us: self.miss_latency_total_us.load(Ordering::Relaxed),
            miss_latency_max_us: self.miss_latency_max_us.load(Ordering::Relaxed),
        }
    }
}
