//! # Local Room Cache
//!
//! A per-process, in-memory mirror of one room's occupants. It is seeded
//! once with a full store snapshot when the process first serves the room,
//! and thereafter updated only by applying the room's event stream; it never
//! re-queries the store and is never consulted to validate anything. The
//! store stays the sole authority; the cache only answers "who is here" and
//! feeds the proximity engine.
//!
//! Bus delivery is best-effort ordered per publisher, not globally
//! linearized, so every applier here is written to tolerate reordering and
//! duplication: joins upsert, moves for unknown occupants are ignored
//! rather than invented, leaves are idempotent. Caches drift toward the
//! store's truth instead of diverging from it.
//!
//! Neighbor sets double as the active peer-session ledger and are kept
//! symmetric: a near transition is admitted only while the counterpart
//! holds fewer than K sessions, an admitted pair lands in both sets, and a
//! far transition dissolves the pair from both. The K cap thereby bounds
//! concurrent sessions per occupant, not just the mover's own bookkeeping.

use crate::events::RoomEvent;
use crate::proximity::{self, Neighbor, ProximityConfig, Transitions};
use crate::types::{OccupantRecord, RoomId, UserId};
use std::collections::HashMap;
use tracing::debug;

/// One room's cached occupants plus the per-occupant neighbor sets retained
/// for diffing.
#[derive(Debug)]
pub struct RoomCache {
    room_id: RoomId,
    occupants: HashMap<UserId, OccupantRecord>,
    neighbor_sets: HashMap<UserId, Vec<Neighbor>>,
    proximity: ProximityConfig,
}

impl RoomCache {
    /// Builds a cache from a full `listOccupants` snapshot.
    ///
    /// Neighbor sets start empty; each occupant's first applied event
    /// produces their initial set (and the corresponding near transitions).
    pub fn seed(
        room_id: RoomId,
        snapshot: HashMap<UserId, OccupantRecord>,
        proximity: ProximityConfig,
    ) -> Self {
        debug!(
            "🧩 Seeded cache for room {} with {} occupant(s)",
            room_id,
            snapshot.len()
        );
        Self {
            room_id,
            occupants: snapshot,
            neighbor_sets: HashMap::new(),
            proximity,
        }
    }

    /// The room this cache mirrors.
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Current occupant map.
    pub fn occupants(&self) -> &HashMap<UserId, OccupantRecord> {
        &self.occupants
    }

    /// One occupant's cached record.
    pub fn occupant(&self, user: &UserId) -> Option<&OccupantRecord> {
        self.occupants.get(user)
    }

    /// True once the last occupant left; the owning process drops the cache
    /// (and its room task) at that point.
    pub fn is_empty(&self) -> bool {
        self.occupants.is_empty()
    }

    /// Applies one lifecycle event and returns the mover's near/far
    /// transitions.
    ///
    /// Join and move recompute the affected occupant's neighbor set and
    /// diff it against the previous one. Leave scrubs the leaver from every
    /// retained set without emitting far transitions; the room-wide left
    /// broadcast is the teardown signal in that case.
    pub fn apply(&mut self, event: &RoomEvent) -> Transitions {
        match event {
            RoomEvent::Joined {
                user_id,
                position,
                socket_id,
            } => {
                self.occupants
                    .insert(user_id.clone(), OccupantRecord::new(*position, *socket_id));
                self.recompute(user_id)
            }
            RoomEvent::Moved { user_id, position } => {
                match self.occupants.get_mut(user_id) {
                    Some(record) => record.cell = *position,
                    None => {
                        // Reordered past this occupant's join; a later event
                        // or reseed restores them.
                        debug!(
                            "🧩 Ignoring move for unknown occupant {} in room {}",
                            user_id, self.room_id
                        );
                        return Transitions::default();
                    }
                }
                self.recompute(user_id)
            }
            RoomEvent::Left { user_id } => {
                self.occupants.remove(user_id);
                self.neighbor_sets.remove(user_id);
                for set in self.neighbor_sets.values_mut() {
                    set.retain(|neighbor| &neighbor.user_id != user_id);
                }
                Transitions::default()
            }
        }
    }

    fn recompute(&mut self, user: &UserId) -> Transitions {
        let Some(record) = self.occupants.get(user) else {
            return Transitions::default();
        };
        let candidates =
            proximity::neighbors_of(user, record.cell, &self.occupants, &self.proximity);
        let previous = self.neighbor_sets.get(user).cloned().unwrap_or_default();
        let raw = proximity::diff(&previous, &candidates);

        // Reconcile the raw diff into symmetric pairs. A counterpart at
        // capacity rejects the pair, and the candidate is dropped from the
        // mover's side too so neither occupant holds a half-open session.
        let mut kept = candidates;
        let mut near = Vec::new();
        for candidate in raw.near {
            if self.admit_pair(user, &candidate) {
                near.push(candidate);
            } else {
                kept.retain(|n| n.user_id != candidate.user_id);
            }
        }
        let mut far = Vec::new();
        for former in raw.far {
            if self.dissolve_pair(user, &former.user_id) {
                far.push(former);
            }
        }

        self.neighbor_sets.insert(user.clone(), kept);
        Transitions { near, far }
    }

    /// Counterpart side of a new pair. Admitted while the counterpart holds
    /// fewer than K sessions; the mover is then recorded in the
    /// counterpart's set to keep pairing symmetric.
    fn admit_pair(&mut self, user: &UserId, candidate: &Neighbor) -> bool {
        let Some(mover) = self.occupants.get(user) else {
            return false;
        };
        let entry = Neighbor {
            user_id: user.clone(),
            socket_id: mover.socket_id,
            distance: candidate.distance,
        };
        let max_peers = self.proximity.max_peers;
        let set = self.neighbor_sets.entry(candidate.user_id.clone()).or_default();
        if set.iter().any(|n| &n.user_id == user) {
            return true;
        }
        if set.len() >= max_peers {
            return false;
        }
        set.push(entry);
        set.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.user_id.as_str().cmp(b.user_id.as_str()))
        });
        true
    }

    /// Removes the mover from the counterpart's set. Returns whether the
    /// pair actually existed, so half-open leftovers dissolve silently.
    fn dissolve_pair(&mut self, user: &UserId, counterpart: &UserId) -> bool {
        match self.neighbor_sets.get_mut(counterpart) {
            Some(set) => {
                let was_paired = set.iter().any(|n| &n.user_id == user);
                set.retain(|n| &n.user_id != user);
                was_paired
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cell, SocketId};

    fn joined(user: &str, cell: Cell, socket: SocketId) -> RoomEvent {
        RoomEvent::Joined {
            user_id: UserId::from(user),
            position: cell,
            socket_id: socket,
        }
    }

    fn cache() -> RoomCache {
        RoomCache::seed(
            RoomId::from("r"),
            HashMap::new(),
            ProximityConfig::default(),
        )
    }

    #[test]
    fn join_within_radius_produces_near_transition() {
        let mut cache = cache();
        let a_socket = SocketId::new();
        assert!(cache.apply(&joined("a", Cell::new(1, 1), a_socket)).is_empty());

        let transitions = cache.apply(&joined("b", Cell::new(3, 1), SocketId::new()));
        assert_eq!(transitions.near.len(), 1);
        assert_eq!(transitions.near[0].user_id, UserId::from("a"));
        assert_eq!(transitions.near[0].socket_id, a_socket);
        assert!(transitions.far.is_empty());
    }

    #[test]
    fn duplicate_events_are_idempotent() {
        let mut cache = cache();
        cache.apply(&joined("a", Cell::new(1, 1), SocketId::new()));
        let event = joined("b", Cell::new(2, 1), SocketId::new());

        let first = cache.apply(&event);
        assert_eq!(first.near.len(), 1);

        let second = cache.apply(&event);
        assert!(second.is_empty());
        assert_eq!(cache.occupants().len(), 2);
    }

    #[test]
    fn move_out_of_radius_produces_far_transition() {
        let mut cache = cache();
        cache.apply(&joined("a", Cell::new(1, 1), SocketId::new()));
        cache.apply(&joined("b", Cell::new(2, 1), SocketId::new()));

        let mut transitions = Transitions::default();
        // Walk b rightwards one step at a time until a falls out of range.
        for x in 3..=8 {
            transitions = cache.apply(&RoomEvent::Moved {
                user_id: UserId::from("b"),
                position: Cell::new(x, 1),
            });
            if !transitions.far.is_empty() {
                break;
            }
        }
        assert_eq!(transitions.far.len(), 1);
        assert_eq!(transitions.far[0].user_id, UserId::from("a"));
    }

    #[test]
    fn move_for_unknown_occupant_is_ignored() {
        let mut cache = cache();
        cache.apply(&joined("a", Cell::new(1, 1), SocketId::new()));

        let transitions = cache.apply(&RoomEvent::Moved {
            user_id: UserId::from("ghost"),
            position: Cell::new(2, 1),
        });
        assert!(transitions.is_empty());
        assert!(cache.occupant(&UserId::from("ghost")).is_none());
    }

    #[test]
    fn leave_scrubs_the_leaver_from_retained_sets() {
        let mut cache = cache();
        cache.apply(&joined("a", Cell::new(1, 1), SocketId::new()));
        cache.apply(&joined("b", Cell::new(2, 1), SocketId::new()));

        cache.apply(&RoomEvent::Left {
            user_id: UserId::from("b"),
        });
        assert!(cache.occupant(&UserId::from("b")).is_none());

        // A later move of a must not report a stale far for b.
        let transitions = cache.apply(&RoomEvent::Moved {
            user_id: UserId::from("a"),
            position: Cell::new(1, 2),
        });
        assert!(transitions.far.is_empty());
    }

    #[test]
    fn counterpart_at_capacity_rejects_new_pairs() {
        let mut cache = RoomCache::seed(
            RoomId::from("r"),
            HashMap::new(),
            ProximityConfig {
                radius: 5.0,
                max_peers: 1,
            },
        );
        cache.apply(&joined("x", Cell::new(10, 10), SocketId::new()));
        let first = cache.apply(&joined("a", Cell::new(11, 10), SocketId::new()));
        assert_eq!(first.near.len(), 1);

        // b would rank x nearest, but x already holds its one session.
        let second = cache.apply(&joined("b", Cell::new(9, 10), SocketId::new()));
        assert!(second.is_empty());

        // The pair dissolves when a walks out of range, freeing x.
        let dissolved = cache.apply(&RoomEvent::Moved {
            user_id: UserId::from("a"),
            position: Cell::new(20, 10),
        });
        assert_eq!(dissolved.far.len(), 1);
        assert_eq!(dissolved.far[0].user_id, UserId::from("x"));

        // b's next recompute can now pair with x.
        let paired = cache.apply(&RoomEvent::Moved {
            user_id: UserId::from("b"),
            position: Cell::new(9, 9),
        });
        assert_eq!(paired.near.len(), 1);
        assert_eq!(paired.near[0].user_id, UserId::from("x"));
    }

    #[test]
    fn seeded_occupants_gain_sets_on_first_event() {
        let socket = SocketId::new();
        let snapshot = HashMap::from([
            (
                UserId::from("a"),
                OccupantRecord::new(Cell::new(1, 1), SocketId::new()),
            ),
            (
                UserId::from("b"),
                OccupantRecord::new(Cell::new(2, 1), socket),
            ),
        ]);
        let mut cache = RoomCache::seed(RoomId::from("r"), snapshot, ProximityConfig::default());
        assert_eq!(cache.occupants().len(), 2);

        // The seeding process then applies b's own join event (echo of the
        // add that triggered the seed): prior set empty, so b nears a.
        let transitions = cache.apply(&joined("b", Cell::new(2, 1), socket));
        assert_eq!(transitions.near.len(), 1);
        assert_eq!(transitions.near[0].user_id, UserId::from("a"));
    }
}
