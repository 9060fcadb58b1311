//! Notifications fired when cache entries are dropped.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{RegionId, StoreId};

/// What part of the cache an invalidation touched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheType {
    /// A region together with the store it was routed to.
    RegionStore,
    /// A single region.
    Region,
    /// A single store.
    Store,
    /// Every cached region.
    All,
}

/// Describes one invalidation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheInvalidateEvent {
    /// Region involved, if any.
    pub region_id: Option<RegionId>,
    /// Store involved, if any.
    pub store_id: Option<StoreId>,
    /// A region entry was dropped.
    pub invalidate_region: bool,
    /// A store entry was dropped.
    pub invalidate_store: bool,
    /// Which part of the cache was touched.
    pub cache_type: CacheType,
}

impl CacheInvalidateEvent {
    /// A region dropped on its own.
    pub fn region(region_id: RegionId) -> Self {
        Self {
            region_id: Some(region_id),
            store_id: None,
            invalidate_region: true,
            invalidate_store: false,
            cache_type: CacheType::Region,
        }
    }

    /// A store dropped by id.
    pub fn store(store_id: StoreId) -> Self {
        Self {
            region_id: None,
            store_id: Some(store_id),
            invalidate_region: false,
            invalidate_store: true,
            cache_type: CacheType::Store,
        }
    }

    /// A region dropped because of the store it was led from.
    pub fn region_store(region_id: RegionId, store_id: StoreId) -> Self {
        Self {
            region_id: Some(region_id),
            store_id: Some(store_id),
            invalidate_region: true,
            invalidate_store: false,
            cache_type: CacheType::RegionStore,
        }
    }

    /// Every region dropped at once.
    pub fn all() -> Self {
        Self {
            region_id: None,
            store_id: None,
            invalidate_region: true,
            invalidate_store: false,
            cache_type: CacheType::All,
        }
    }
}

/// Subscriber for invalidation events. Fire-and-forget: the return value is ignored.
pub type InvalidationCallback = Arc<dyn Fn(CacheInvalidateEvent) + Send + Sync>;
