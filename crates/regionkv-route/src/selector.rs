//! Replica selection policy.
//!
//! A selector turns a region's replication group into an ordered list of
//! candidate peers for a request. Callers try candidates in order.

use serde::{Deserialize, Serialize};

use crate::types::Peer;

/// Policy choosing which peers of a region are eligible request targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReplicaSelector {
    /// Only the leader (linearizable reads and all writes).
    #[default]
    Leader,
    /// Only followers.
    Follower,
    /// Followers first, then the leader as a last resort.
    LeaderAndFollower,
}

impl ReplicaSelector {
    /// Returns the ordered candidate list for the given replication group.
    ///
    /// Learners are never candidates here; reaching learner-only store kinds
    /// goes through label matching in the region manager instead.
    pub fn select(&self, leader: &Peer, followers: &[Peer], _learners: &[Peer]) -> Vec<Peer> {
        match self {
            ReplicaSelector::Leader => vec![*leader],
            ReplicaSelector::Follower => followers.to_vec(),
            ReplicaSelector::LeaderAndFollower => {
                let mut list = Vec::with_capacity(followers.len() + 1);
                list.extend_from_slice(followers);
                list.push(*leader);
                list
            }
        }
    }
}
