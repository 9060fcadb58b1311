use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Represents a unique identifier for a region (a contiguous key range)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId(u64);

impl RegionId {
    /// Creates a new RegionId from a raw u64 value
    pub fn new(id: u64) -> Self {
        RegionId(id)
    }

    /// Returns the raw u64 value of this region ID
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represents a unique identifier for a store (a cluster node hosting replicas)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreId(u64);

impl StoreId {
    /// Creates a new StoreId from a raw u64 value
    pub fn new(id: u64) -> Self {
        StoreId(id)
    }

    /// Returns the raw u64 value of this store ID
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represents a unique identifier for a peer (one replica of a region)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(u64);

impl PeerId {
    /// Creates a new PeerId from a raw u64 value
    pub fn new(id: u64) -> Self {
        PeerId(id)
    }

    /// Returns the raw u64 value of this peer ID
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Replication role of a peer within its region's group
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PeerRole {
    /// Voting member of the replication group.
    #[default]
    Voter,
    /// Non-voting member, typically used for specialized read workloads.
    Learner,
}

/// A replica role instance bound to one store within one region
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    /// Peer identifier, unique within the cluster.
    pub id: PeerId,
    /// Store hosting this peer.
    pub store_id: StoreId,
    /// Voter or learner.
    pub role: PeerRole,
}

impl Peer {
    /// Creates a voting peer.
    pub fn voter(id: u64, store_id: u64) -> Self {
        Self {
            id: PeerId::new(id),
            store_id: StoreId::new(store_id),
            role: PeerRole::Voter,
        }
    }

    /// Creates a learner peer.
    pub fn learner(id: u64, store_id: u64) -> Self {
        Self {
            id: PeerId::new(id),
            store_id: StoreId::new(store_id),
            role: PeerRole::Learner,
        }
    }

    /// Returns true if this peer is a learner.
    pub fn is_learner(&self) -> bool {
        self.role == PeerRole::Learner
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer {} on store {}", self.id, self.store_id)
    }
}

/// Region configuration and data versions, bumped by membership changes and splits/merges
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RegionEpoch {
    /// Bumped on every peer membership change.
    pub conf_ver: u64,
    /// Bumped on every split or merge.
    pub version: u64,
}

impl RegionEpoch {
    /// Creates a new epoch.
    pub fn new(conf_ver: u64, version: u64) -> Self {
        Self { conf_ver, version }
    }
}

impl fmt::Display for RegionEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conf_ver:{} ver:{}", self.conf_ver, self.version)
    }
}

/// Region metadata as reported by the metadata authority
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionDescriptor {
    /// Region identifier.
    pub id: RegionId,
    /// Inclusive start of the key range. Empty means the start of the keyspace.
    pub start_key: Vec<u8>,
    /// Exclusive end of the key range. Empty means unbounded.
    pub end_key: Vec<u8>,
    /// Region epoch.
    pub epoch: RegionEpoch,
    /// All peers of the replication group.
    pub peers: Vec<Peer>,
}

impl RegionDescriptor {
    /// Creates a descriptor covering `[start_key, end_key)`.
    pub fn new(
        id: u64,
        start_key: impl Into<Vec<u8>>,
        end_key: impl Into<Vec<u8>>,
        peers: Vec<Peer>,
    ) -> Self {
        Self {
            id: RegionId::new(id),
            start_key: start_key.into(),
            end_key: end_key.into(),
            epoch: RegionEpoch::default(),
            peers,
        }
    }
}

/// Lifecycle state of a store
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StoreState {
    /// Serving normally.
    #[default]
    Up,
    /// Being decommissioned; still serving.
    Offline,
    /// Permanently removed from the cluster.
    Tombstone,
}

/// A key/value label attached to a store
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreLabel {
    /// Label key.
    pub key: String,
    /// Label value.
    pub value: String,
}

impl StoreLabel {
    /// Creates a new label.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Store metadata as reported by the metadata authority
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDescriptor {
    /// Store identifier.
    pub id: StoreId,
    /// Network address the store listens on.
    pub address: String,
    /// Labels used for store-type discrimination.
    pub labels: Vec<StoreLabel>,
    /// Lifecycle state.
    pub state: StoreState,
}

impl StoreDescriptor {
    /// Creates an `Up` store with no labels.
    pub fn new(id: u64, address: impl Into<String>) -> Self {
        Self {
            id: StoreId::new(id),
            address: address.into(),
            labels: Vec::new(),
            state: StoreState::Up,
        }
    }

    /// Adds a label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push(StoreLabel::new(key, value));
        self
    }

    /// Sets the lifecycle state.
    pub fn with_state(mut self, state: StoreState) -> Self {
        self.state = state;
        self
    }
}

/// Label key identifying the storage engine of a store.
pub const ENGINE_LABEL_KEY: &str = "engine";
/// Label value identifying columnar replica stores.
pub const ENGINE_LABEL_COLUMNAR: &str = "tiflash";

/// Kind of store a request wants to reach
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StoreKind {
    /// Row-oriented primary stores, reached through the region leader.
    #[default]
    Primary,
    /// Columnar replica stores, reached through learner peers.
    Columnar,
}

impl StoreKind {
    /// Returns the label key/value that marks stores of this kind, if any.
    pub fn label(&self) -> Option<(&'static str, &'static str)> {
        match self {
            StoreKind::Primary => None,
            StoreKind::Columnar => Some((ENGINE_LABEL_KEY, ENGINE_LABEL_COLUMNAR)),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Primary => write!(f, "primary"),
            StoreKind::Columnar => write!(f, "columnar"),
        }
    }
}

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Allocates a process-wide unique generation tag for a cached value.
///
/// Two `Region` (or `Store`) values are the same cache entry only if their
/// generations match; equal contents with different generations are distinct.
pub(crate) fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// Formats a key for log and error messages, printing UTF-8 when possible.
pub fn format_key(key: &[u8]) -> String {
    match std::str::from_utf8(key) {
        Ok(s) => s.to_string(),
        Err(_) => key.iter().map(|b| format!("{:02x}", b)).collect(),
    }
}
