//! Read-only interface to the cluster's metadata authority.
//!
//! The routing cache only consumes this trait. Transport, serialization and
//! retry policy belong to the implementation, which receives the caller's
//! [`Backoffer`] on every call.

use async_trait::async_trait;

use crate::backoff::Backoffer;
use crate::error::Result;
use crate::types::{Peer, RegionDescriptor, RegionId, StoreDescriptor, StoreId};

/// Source of truth for region and store metadata.
#[async_trait]
pub trait MetadataAuthority: Send + Sync + 'static {
    /// Returns the region owning `key` and its current leader.
    ///
    /// An empty `key` addresses the first region of the keyspace.
    async fn get_region_by_key(
        &self,
        backoff: &mut Backoffer,
        key: &[u8],
    ) -> Result<(RegionDescriptor, Peer)>;

    /// Returns the region with the given id and its current leader.
    async fn get_region_by_id(
        &self,
        backoff: &mut Backoffer,
        id: RegionId,
    ) -> Result<(RegionDescriptor, Peer)>;

    /// Returns the descriptor of the given store, tombstoned or not.
    async fn get_store(&self, backoff: &mut Backoffer, id: StoreId) -> Result<StoreDescriptor>;
}
