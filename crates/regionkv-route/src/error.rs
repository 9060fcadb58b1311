use thiserror::Error;

use crate::types::{RegionId, StoreId, StoreKind};

/// Errors reported by the metadata authority client.
#[derive(Debug, Error)]
pub enum AuthorityError {
    /// The authority could not be reached.
    #[error("metadata authority unavailable: {reason}")]
    Unavailable {
        /// Transport-level cause.
        reason: String,
    },

    /// The authority did not answer in time.
    #[error("metadata authority request timed out after {timeout_ms}ms")]
    Timeout {
        /// Deadline that expired.
        timeout_ms: u64,
    },

    /// No region covers the key, or no region has the id.
    #[error("metadata authority has no region for the requested key or id")]
    RegionNotFound,

    /// The store id is unknown.
    #[error("metadata authority has no store {0}")]
    StoreNotFound(StoreId),

    /// Any other authority-side failure.
    #[error("metadata authority internal error: {0}")]
    Internal(String),
}

/// Errors returned by the routing cache and region manager.
#[derive(Debug, Error)]
pub enum RouteError {
    /// No region owns the requested key.
    #[error("region not exist for key: {key} (store kind {kind})")]
    RegionNotFound {
        /// Requested key, printable.
        key: String,
        /// Requested store kind.
        kind: StoreKind,
    },

    /// The authority returned a structurally invalid region.
    #[error("invalid region: {region}")]
    InvalidRegion {
        /// The rejected region, formatted.
        region: String,
    },

    /// The region resolved for a routed key was structurally invalid.
    #[error("invalid region for key: {key} (store kind {kind}): {region}")]
    InvalidRegionForKey {
        /// Requested key, printable.
        key: String,
        /// Requested store kind.
        kind: StoreKind,
        /// The rejected region, formatted.
        region: String,
    },

    /// The store is unknown or tombstoned.
    #[error("store {0} not found")]
    StoreNotFound(StoreId),

    /// No store of the requested kind backs the region.
    #[error("cannot find valid store on {kind} for region {region_id}")]
    NoStoreForKind {
        /// Region that was searched.
        region_id: RegionId,
        /// Requested store kind.
        kind: StoreKind,
    },

    /// The retry budget ran out.
    #[error("backoff budget exhausted after {attempts} attempts: {last_error}")]
    BackoffExhausted {
        /// Rounds taken before giving up.
        attempts: u32,
        /// The error of the final attempt.
        last_error: AuthorityError,
    },

    /// Non-retryable authority failure.
    #[error(transparent)]
    Authority(#[from] AuthorityError),
}

/// Result alias for routing operations.
pub type Result<T> = std::result::Result<T, RouteError>;

/// Check if an authority error is worth retrying under a backoff budget.
///
/// Transport-level failures are transient; a definitive "not found" answer is not.
pub fn is_retryable(error: &AuthorityError) -> bool {
    match error {
        AuthorityError::Unavailable { .. } => true,
        AuthorityError::Timeout { .. } => true,
        AuthorityError::Internal(_) => true,
        AuthorityError::RegionNotFound => false,
        AuthorityError::StoreNotFound(_) => false,
    }
}
