//! # Proximity Engine
//!
//! Computes an occupant's bounded, distance-ranked neighbor set and diffs it
//! against the previous computation to produce near/far transitions. The
//! whole engine is pure: it sees only positions already in the local room
//! cache and never talks to the store.
//!
//! A full recompute on every position change is deliberate; room
//! populations are small and bounded (K caps how many peer sessions a
//! client can hold anyway), so a scan beats maintaining an incremental
//! spatial index.

use crate::types::{Cell, OccupantRecord, SocketId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Tuning for the neighbor computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProximityConfig {
    /// Radius R in cells; occupants farther than this are never neighbors.
    #[serde(default = "default_radius")]
    pub radius: f64,
    /// Cap K on the neighbor set, keeping the nearest K within R.
    #[serde(default = "default_max_peers")]
    pub max_peers: usize,
}

fn default_radius() -> f64 {
    5.0
}

fn default_max_peers() -> usize {
    10
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            radius: default_radius(),
            max_peers: default_max_peers(),
        }
    }
}

/// One entry of a neighbor set.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub user_id: UserId,
    /// Socket the counterpart is reachable on, so transition notifications
    /// can address signaling directly.
    pub socket_id: SocketId,
    pub distance: f64,
}

/// Near/far transitions produced by diffing two neighbor sets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transitions {
    /// Newly within range: start negotiating peer sessions.
    pub near: Vec<Neighbor>,
    /// Newly out of range: tear peer sessions down.
    pub far: Vec<Neighbor>,
}

impl Transitions {
    /// True when the diff produced nothing to notify.
    pub fn is_empty(&self) -> bool {
        self.near.is_empty() && self.far.is_empty()
    }
}

/// Computes the neighbor set of `of` standing at `at`.
///
/// Every other cached occupant within `radius` is ranked by Euclidean
/// distance ascending (ties broken by user id so the ranking is
/// deterministic) and the nearest `max_peers` are kept.
pub fn neighbors_of(
    of: &UserId,
    at: Cell,
    occupants: &HashMap<UserId, OccupantRecord>,
    config: &ProximityConfig,
) -> Vec<Neighbor> {
    let mut found: Vec<Neighbor> = occupants
        .iter()
        .filter(|(user_id, _)| *user_id != of)
        .filter_map(|(user_id, record)| {
            let distance = at.distance(record.cell);
            (distance <= config.radius).then(|| Neighbor {
                user_id: user_id.clone(),
                socket_id: record.socket_id,
                distance,
            })
        })
        .collect();
    found.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.user_id.as_str().cmp(b.user_id.as_str()))
    });
    found.truncate(config.max_peers);
    found
}

/// Diffs two neighbor sets of the same occupant.
///
/// Ids present only in `current` are near transitions; ids present only in
/// `previous` are far transitions. Far entries carry the socket recorded at
/// the previous computation, which is the right address even when the
/// counterpart has since moved.
pub fn diff(previous: &[Neighbor], current: &[Neighbor]) -> Transitions {
    let previous_ids: HashSet<&UserId> = previous.iter().map(|n| &n.user_id).collect();
    let current_ids: HashSet<&UserId> = current.iter().map(|n| &n.user_id).collect();

    Transitions {
        near: current
            .iter()
            .filter(|n| !previous_ids.contains(&n.user_id))
            .cloned()
            .collect(),
        far: previous
            .iter()
            .filter(|n| !current_ids.contains(&n.user_id))
            .cloned()
            .collect(),
    }
}
