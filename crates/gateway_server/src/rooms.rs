//! Per-room tasks and the process-local room directory.
//!
//! Every room with at least one occupant on this process runs as one task
//! owning the room's [`RoomCache`]. All lifecycle events for the room, local
//! and relayed, are queued onto that task, which gives each room a single
//! execution context: events apply in queue order, and the proximity
//! bookkeeping never races itself.
//!
//! The task fans the client-facing mirror of each event out to every
//! locally-held socket in the room, and for locally-originated events it
//! also emits both directions of every near/far transition. Relayed events
//! update the cache only; the process that owns the mover's socket already
//! emitted the notifications.
//!
//! A task stops itself once a departure leaves its cache empty. The
//! directory detects the dead queue on the next send, drops the entry, and
//! the next join re-seeds a fresh task from a store snapshot.

use crate::connection::ConnectionManager;
use crate::messaging::ServerMessage;
use dashmap::DashMap;
use huddle_room_system::{
    EventBus, OccupantRecord, ProcEvent, ProximityConfig, RoomCache, RoomEvent, RoomId, RoomStore,
    SocketId, Transitions, UserId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Queue depth per room task. Deep enough to absorb a burst of relayed
/// events while the task waits on a registry lookup.
const ROOM_QUEUE: usize = 256;

/// Where an event entered this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventOrigin {
    /// A verb handled on this process; transitions are emitted
    Local,
    /// Relayed off the bus from another process; cache bookkeeping only
    Remote,
}

/// A unit of work queued onto a room task.
#[derive(Debug)]
pub(crate) enum RoomCommand {
    Apply {
        event: RoomEvent,
        origin: EventOrigin,
    },
}

/// Directory of the rooms this process currently serves.
///
/// Maps room ids to the queue of the task serving them. Entries appear when
/// a local occupant joins and disappear when the task stops or the store
/// reports the room deleted.
pub(crate) struct RoomDirectory {
    rooms: DashMap<RoomId, mpsc::Sender<RoomCommand>>,
    connections: Arc<ConnectionManager>,
    store: Arc<dyn RoomStore>,
    bus: Arc<dyn EventBus>,
    proximity: ProximityConfig,
}

impl RoomDirectory {
    pub fn new(
        connections: Arc<ConnectionManager>,
        store: Arc<dyn RoomStore>,
        bus: Arc<dyn EventBus>,
        proximity: ProximityConfig,
    ) -> Self {
        Self {
            rooms: DashMap::new(),
            connections,
            store,
            bus,
            proximity,
        }
    }

    /// Applies a locally-originated event, seeding a task for the room from
    /// the given store snapshot if this process was not serving it yet.
    ///
    /// The snapshot already contains the event's own effect (it was taken
    /// after the store transaction), so the seeded cache starts consistent
    /// and the queued event is a no-op for it beyond transition bookkeeping.
    pub async fn apply_seeded(
        &self,
        room_id: &RoomId,
        snapshot: HashMap<UserId, OccupantRecord>,
        event: RoomEvent,
    ) {
        let sender = self
            .rooms
            .entry(room_id.clone())
            .or_insert_with(|| self.spawn_task(room_id.clone(), snapshot.clone()))
            .clone();
        if sender
            .send(RoomCommand::Apply {
                event: event.clone(),
                origin: EventOrigin::Local,
            })
            .await
            .is_err()
        {
            // The task stopped between lookup and send. Reseed and replay.
            self.rooms.remove(room_id);
            let sender = self
                .rooms
                .entry(room_id.clone())
                .or_insert_with(|| self.spawn_task(room_id.clone(), snapshot))
                .clone();
            if sender
                .send(RoomCommand::Apply {
                    event,
                    origin: EventOrigin::Local,
                })
                .await
                .is_err()
            {
                warn!("⚠️ Reseeded room task for {} refused its first event", room_id);
            }
        }
    }

    /// Applies a locally-originated event to an already-served room.
    pub async fn apply_local(&self, room_id: &RoomId, event: RoomEvent) {
        let Some(sender) = self.rooms.get(room_id).map(|entry| entry.clone()) else {
            warn!(
                "⚠️ No room task for {} while applying a local event",
                room_id
            );
            return;
        };
        if sender
            .send(RoomCommand::Apply {
                event,
                origin: EventOrigin::Local,
            })
            .await
            .is_err()
        {
            self.rooms.remove(room_id);
            warn!("⚠️ Room task for {} stopped with local occupants", room_id);
        }
    }

    /// Applies an event relayed from another process.
    ///
    /// Rooms this process does not serve are skipped: with no local
    /// occupants there is nobody to notify and no cache to keep.
    pub async fn apply_remote(&self, room_id: &RoomId, event: RoomEvent) {
        let Some(sender) = self.rooms.get(room_id).map(|entry| entry.clone()) else {
            return;
        };
        if sender
            .send(RoomCommand::Apply {
                event,
                origin: EventOrigin::Remote,
            })
            .await
            .is_err()
        {
            // The task drained its queue and stopped; stale entry.
            self.rooms.remove(room_id);
        }
    }

    /// Drops the directory entry for a room the store reported deleted.
    pub fn remove(&self, room_id: &RoomId) {
        if self.rooms.remove(room_id).is_some() {
            debug!("🧹 Dropped room task entry for {}", room_id);
        }
    }

    /// Number of rooms this process currently serves.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn spawn_task(
        &self,
        room_id: RoomId,
        snapshot: HashMap<UserId, OccupantRecord>,
    ) -> mpsc::Sender<RoomCommand> {
        let (sender, receiver) = mpsc::channel(ROOM_QUEUE);
        let task = RoomTask {
            cache: RoomCache::seed(room_id.clone(), snapshot, self.proximity),
            connections: self.connections.clone(),
            store: self.store.clone(),
            bus: self.bus.clone(),
            receiver,
        };
        tokio::spawn(task.run());
        info!("🧩 Serving room {}", room_id);
        sender
    }
}

/// The task owning one room's cache and neighbor bookkeeping.
struct RoomTask {
    cache: RoomCache,
    connections: Arc<ConnectionManager>,
    store: Arc<dyn RoomStore>,
    bus: Arc<dyn EventBus>,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomTask {
    async fn run(mut self) {
        while let Some(command) = self.receiver.recv().await {
            match command {
                RoomCommand::Apply { event, origin } => {
                    let transitions = self.cache.apply(&event);
                    self.broadcast(&event).await;
                    if origin == EventOrigin::Local {
                        self.notify_transitions(&event, &transitions).await;
                    }
                    if matches!(event, RoomEvent::Left { .. }) && self.cache.is_empty() {
                        debug!("🧹 Room {} emptied, stopping its task", self.cache.room_id());
                        break;
                    }
                }
            }
        }
    }

    /// Fans the client-facing mirror of a lifecycle event out to every
    /// locally-held socket in the post-apply room.
    ///
    /// The occupant map was already updated, so a joiner receives its own
    /// `player:joined` and a leaver is naturally excluded.
    async fn broadcast(&self, event: &RoomEvent) {
        let message = match event {
            RoomEvent::Joined {
                user_id,
                position,
                socket_id,
            } => ServerMessage::PlayerJoined {
                player_id: user_id.clone(),
                position: *position,
                socket_id: *socket_id,
            },
            RoomEvent::Moved { user_id, position } => ServerMessage::PlayerMoved {
                player_id: user_id.clone(),
                position: *position,
            },
            RoomEvent::Left { user_id } => ServerMessage::PlayerLeft {
                player_id: user_id.clone(),
            },
        };
        for record in self.cache.occupants().values() {
            // Sockets held by other processes fall through; their own
            // gateway delivers to them.
            self.connections
                .send_message_to_socket(record.socket_id, &message)
                .await;
        }
    }

    /// Emits both directions of every transition produced by a local event.
    ///
    /// The mover's side goes straight to its socket on this process. The
    /// counterpart's side is delivered directly when its socket is local,
    /// otherwise relayed to the process the registry names as its owner.
    async fn notify_transitions(&self, event: &RoomEvent, transitions: &Transitions) {
        if transitions.is_empty() {
            return;
        }
        let (mover, mover_socket) = match event {
            RoomEvent::Joined {
                user_id, socket_id, ..
            } => (user_id.clone(), *socket_id),
            RoomEvent::Moved { user_id, .. } => match self.cache.occupant(user_id) {
                Some(record) => (user_id.clone(), record.socket_id),
                None => return,
            },
            // Departure teardown rides the player:left broadcast.
            RoomEvent::Left { .. } => return,
        };

        for neighbor in &transitions.near {
            self.connections
                .send_message_to_socket(
                    mover_socket,
                    &ServerMessage::PlayerNear {
                        player_id: neighbor.user_id.clone(),
                        socket_id: neighbor.socket_id,
                    },
                )
                .await;
            self.notify_counterpart(
                neighbor.socket_id,
                ProcEvent::Near {
                    to: neighbor.socket_id,
                    user_id: mover.clone(),
                    socket_id: mover_socket,
                },
            )
            .await;
        }
        for neighbor in &transitions.far {
            self.connections
                .send_message_to_socket(
                    mover_socket,
                    &ServerMessage::PlayerFar {
                        player_id: neighbor.user_id.clone(),
                        socket_id: neighbor.socket_id,
                    },
                )
                .await;
            self.notify_counterpart(
                neighbor.socket_id,
                ProcEvent::Far {
                    to: neighbor.socket_id,
                    user_id: mover.clone(),
                    socket_id: mover_socket,
                },
            )
            .await;
        }
    }

    /// Delivers one transition to the counterpart socket: directly when it
    /// is local, via its owner's process channel otherwise. A socket the
    /// registry no longer knows is dropped.
    async fn notify_counterpart(&self, target: SocketId, event: ProcEvent) {
        let message = match &event {
            ProcEvent::Near {
                user_id, socket_id, ..
            } => ServerMessage::PlayerNear {
                player_id: user_id.clone(),
                socket_id: *socket_id,
            },
            ProcEvent::Far {
                user_id, socket_id, ..
            } => ServerMessage::PlayerFar {
                player_id: user_id.clone(),
                socket_id: *socket_id,
            },
            ProcEvent::Signal { .. } => return,
        };
        if self
            .connections
            .send_message_to_socket(target, &message)
            .await
        {
            return;
        }
        match self.store.owner_process(target).await {
            Ok(Some(process)) => {
                let bus = self.bus.clone();
                tokio::spawn(async move {
                    if let Err(e) = bus.publish_proc(process, &event).await {
                        warn!("❌ Failed to relay a transition for socket {}: {}", event.target(), e);
                    }
                });
            }
            Ok(None) => {
                debug!("📡 Dropping a transition for unregistered socket {}", target);
            }
            Err(e) => {
                warn!("❌ Registry lookup failed for socket {}: {}", target, e);
            }
        }
    }
}
