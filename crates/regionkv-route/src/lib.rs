#![warn(missing_docs)]

//! RegionKV client routing: region/store resolution cache, replica selection and request routing

/// Metadata authority client interface
pub mod authority;
/// Retry budget for authority calls
pub mod backoff;
/// Region and store resolution cache
pub mod cache;
/// Routing configuration
pub mod config;
/// Error types
pub mod error;
/// Cache invalidation events
pub mod event;
/// Background store health checking
pub mod health;
/// Routing facade
pub mod manager;
/// Cache metrics
pub mod metrics;
/// Cached region values
pub mod region;
/// Replica selection policies
pub mod selector;
/// Cached store values
pub mod store;
/// Identifiers and metadata descriptors
pub mod types;

pub use authority::MetadataAuthority;
pub use backoff::{BackoffConfig, Backoffer};
pub use cache::RegionCache;
pub use config::RoutingConfig;
pub use error::{AuthorityError, Result, RouteError};
pub use event::{CacheInvalidateEvent, CacheType, InvalidationCallback};
pub use health::{HealthCheckHandle, HealthCheckScheduler, StoreHealthChecker, StoreProber};
pub use manager::RegionManager;
pub use metrics::{CacheMetrics, CacheMetricsSnapshot};
pub use region::Region;
pub use selector::ReplicaSelector;
pub use store::Store;
pub use types::{
    Peer, PeerId, PeerRole, RegionDescriptor, RegionEpoch, RegionId, StoreDescriptor, StoreId,
    StoreKind, StoreLabel, StoreState,
};
