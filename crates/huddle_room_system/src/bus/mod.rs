//! # Event Bus
//!
//! Publish/subscribe fabric connecting the process instances. Two channel
//! kinds exist:
//!
//! - `room:<roomId>` broadcasts occupant lifecycle events to every process
//!   that has served the room;
//! - `proc:<processId>` is point-to-point, carrying signaling relays and
//!   near/far notifications for sockets owned by that one process.
//!
//! A process subscribes once at startup: its own proc channel exactly, plus
//! the room pattern. Publishes are fire-and-forget at the call sites (spawn,
//! log on failure, never retry); subscribers receive a best-effort ordered
//! stream per publisher and apply it through tolerant cache logic.
//!
//! Room frames carry the publishing process's id. The decoder drops frames
//! this process published itself, since the publisher already applied the
//! event and fanned it out to its local sockets on the handler path.
//!
//! Backends: [`RedisEventBus`] over Redis Pub/Sub for multi-process
//! deployments, [`LocalEventBus`] looping frames back in process for
//! single-instance runs and tests. Both put identical JSON on the channel,
//! so either side of the seam sees the same frames.

pub mod local;
pub mod redis;

pub use local::LocalEventBus;
pub use redis::RedisEventBus;

use crate::error::BusError;
use crate::events::{ProcEvent, RoomEvent};
use crate::types::{ProcessId, RoomId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

/// Pattern covering every room channel, for the startup subscription.
pub const ROOM_CHANNEL_PATTERN: &str = "room:*";

/// Channel carrying one room's lifecycle events.
pub fn room_channel(room: &RoomId) -> String {
    format!("room:{room}")
}

/// Channel addressed to one process instance.
pub fn proc_channel(process: ProcessId) -> String {
    format!("proc:{process}")
}

/// Extracts the room id from a room channel name.
pub fn parse_room_channel(channel: &str) -> Option<RoomId> {
    channel.strip_prefix("room:").map(RoomId::from)
}

/// One decoded message arriving on this process's subscriptions.
#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    /// Lifecycle event for a room (which this process may or may not hold).
    Room { room_id: RoomId, event: RoomEvent },
    /// Point-to-point payload addressed to a socket this process owns.
    Proc(ProcEvent),
}

/// Wire envelope for room-channel frames. The origin lets each subscriber
/// drop its own publishes when they echo back through the pattern
/// subscription.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RoomFrame {
    pub origin: ProcessId,
    pub event: RoomEvent,
}

/// The bus contract. One instance per process, created at startup and
/// injected into the gateway.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes a lifecycle event on the room's channel.
    async fn publish_room(&self, room: &RoomId, event: &RoomEvent) -> Result<(), BusError>;

    /// Publishes a point-to-point payload on one process's channel. The
    /// caller resolves `process` through the registry first.
    async fn publish_proc(&self, process: ProcessId, event: &ProcEvent) -> Result<(), BusError>;

    /// Opens this process's subscription stream: its own proc channel plus
    /// every room channel. Called once at startup; the receiver is consumed
    /// by the gateway's bus loop.
    async fn subscribe(&self) -> Result<mpsc::Receiver<BusMessage>, BusError>;
}

/// Decodes one raw frame into a [`BusMessage`], filtering proc frames to
/// this process and dropping this process's own room publishes.
///
/// Undecodable payloads are logged and dropped; a bad frame must never take
/// the subscription loop down.
pub(crate) fn decode_frame(
    channel: &str,
    payload: &str,
    self_process: ProcessId,
) -> Option<BusMessage> {
    if channel == proc_channel(self_process) {
        return match serde_json::from_str::<ProcEvent>(payload) {
            Ok(event) => Some(BusMessage::Proc(event)),
            Err(e) => {
                warn!("❌ Undecodable proc frame on '{}': {}", channel, e);
                None
            }
        };
    }
    if let Some(room_id) = parse_room_channel(channel) {
        return match serde_json::from_str::<RoomFrame>(payload) {
            Ok(frame) if frame.origin == self_process => None,
            Ok(frame) => Some(BusMessage::Room {
                room_id,
                event: frame.event,
            }),
            Err(e) => {
                warn!("❌ Undecodable room frame on '{}': {}", channel, e);
                None
            }
        };
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cell, SocketId, UserId};

    #[test]
    fn channel_names_follow_the_scheme() {
        let process = ProcessId::new();
        assert_eq!(room_channel(&RoomId::from("r-1")), "room:r-1");
        assert_eq!(proc_channel(process), format!("proc:{process}"));
        assert_eq!(parse_room_channel("room:r-1"), Some(RoomId::from("r-1")));
        assert_eq!(parse_room_channel("proc:x"), None);
    }

    #[test]
    fn decode_routes_room_and_proc_frames() {
        let process = ProcessId::new();
        let room_event = RoomEvent::Joined {
            user_id: UserId::from("u"),
            position: Cell::new(1, 1),
            socket_id: SocketId::new(),
        };
        let payload = serde_json::to_string(&RoomFrame {
            origin: ProcessId::new(),
            event: room_event.clone(),
        })
        .expect("serialize room frame");
        assert_eq!(
            decode_frame("room:r-1", &payload, process),
            Some(BusMessage::Room {
                room_id: RoomId::from("r-1"),
                event: room_event,
            })
        );

        let proc_event = ProcEvent::Near {
            to: SocketId::new(),
            user_id: UserId::from("u"),
            socket_id: SocketId::new(),
        };
        let payload = serde_json::to_string(&proc_event).expect("serialize proc event");
        assert_eq!(
            decode_frame(&proc_channel(process), &payload, process),
            Some(BusMessage::Proc(proc_event))
        );
    }

    #[test]
    fn decode_drops_this_processes_own_room_frames() {
        let process = ProcessId::new();
        let payload = serde_json::to_string(&RoomFrame {
            origin: process,
            event: RoomEvent::Left {
                user_id: UserId::from("u"),
            },
        })
        .expect("serialize room frame");
        assert_eq!(decode_frame("room:r-1", &payload, process), None);
    }

    #[test]
    fn decode_drops_garbage_and_foreign_channels() {
        let process = ProcessId::new();
        assert_eq!(decode_frame("room:r-1", "not json", process), None);
        assert_eq!(decode_frame("unrelated", "{}", process), None);
        assert_eq!(
            decode_frame(&proc_channel(ProcessId::new()), "{}", process),
            None
        );
    }
}
