//! # Lifecycle and Routing Events
//!
//! This module defines the payloads carried by the two channel kinds on the
//! event bus: room channels (`room:<roomId>`) carry occupant lifecycle events
//! to every process serving a room, and process channels (`proc:<processId>`)
//! carry point-to-point payloads to the process owning a specific socket.
//!
//! ## Event Categories
//!
//! ### Room Events
//! Broadcast after a store transaction succeeded:
//! - Occupant joined (assigned a cell)
//! - Occupant moved (move accepted)
//! - Occupant left (explicit leave or disconnect)
//!
//! ### Process Events
//! Addressed to one socket on one process:
//! - WebRTC signaling relay between two peers
//! - Near/far proximity transitions for a remote counterpart
//!
//! ## Design Principles
//!
//! - **Closed Unions**: both payloads are tagged enums matched exhaustively,
//!   so adding a variant is a compile-visible change rather than a silently
//!   ignored string tag
//! - **Serialization**: JSON on the wire, the same shape on both bus
//!   backends
//! - **No Authority**: room events describe what the store already accepted;
//!   consumers only project them into caches

use crate::types::{Cell, SocketId, UserId};
use serde::{Deserialize, Serialize};

// ============================================================================
// Room Channel Events
// ============================================================================

/// Occupant lifecycle event, published on `room:<roomId>` after the
/// corresponding store transaction succeeded.
///
/// Consumers apply these to their local room cache in arrival order. Cache
/// appliers tolerate duplicates and reordering, so no consumer depends on
/// bus delivery being linearized; caches are projections, never authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RoomEvent {
    /// A user was assigned a cell in the room.
    #[serde(rename_all = "camelCase")]
    Joined {
        user_id: UserId,
        position: Cell,
        socket_id: SocketId,
    },
    /// A user's move was accepted by the store.
    #[serde(rename_all = "camelCase")]
    Moved { user_id: UserId, position: Cell },
    /// A user left the room (explicit leave or disconnect).
    #[serde(rename_all = "camelCase")]
    Left { user_id: UserId },
}

impl RoomEvent {
    /// The user this event is about.
    pub fn user_id(&self) -> &UserId {
        match self {
            RoomEvent::Joined { user_id, .. } => user_id,
            RoomEvent::Moved { user_id, .. } => user_id,
            RoomEvent::Left { user_id } => user_id,
        }
    }
}

// ============================================================================
// Process Channel Events
// ============================================================================

/// Point-to-point payload, published on `proc:<processId>` of the process
/// that owns the target socket.
///
/// The publisher resolves the owning process through the registry first; a
/// missing registry entry means the socket is already gone and the message
/// is dropped and logged, never retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProcEvent {
    /// WebRTC signaling payload relayed between two peers.
    #[serde(rename_all = "camelCase")]
    Signal {
        /// Socket the payload is addressed to.
        to: SocketId,
        /// Socket that sent it, so the receiver can answer.
        from: SocketId,
        /// Opaque negotiation payload (offer/answer/ICE), relayed untouched.
        data: serde_json::Value,
    },
    /// A mover entered the target's radius; the target should start
    /// negotiating a peer session with `socket_id`.
    #[serde(rename_all = "camelCase")]
    Near {
        to: SocketId,
        user_id: UserId,
        socket_id: SocketId,
    },
    /// A mover left the target's radius; the target should tear the peer
    /// session with `socket_id` down.
    #[serde(rename_all = "camelCase")]
    Far {
        to: SocketId,
        user_id: UserId,
        socket_id: SocketId,
    },
}

impl ProcEvent {
    /// The socket this payload must be delivered to.
    pub fn target(&self) -> SocketId {
        match self {
            ProcEvent::Signal { to, .. } => *to,
            ProcEvent::Near { to, .. } => *to,
            ProcEvent::Far { to, .. } => *to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_event_wire_form_is_tagged() {
        let event = RoomEvent::Moved {
            user_id: UserId::from("u-1"),
            position: Cell::new(2, 3),
        };
        let json = serde_json::to_value(&event).expect("serialize room event");
        assert_eq!(json["type"], "moved");
        assert_eq!(json["userId"], "u-1");
        assert_eq!(json["position"]["x"], 2);

        let back: RoomEvent = serde_json::from_value(json).expect("deserialize room event");
        assert_eq!(back, event);
    }

    #[test]
    fn proc_event_round_trips_with_opaque_data() {
        let to = SocketId::new();
        let from = SocketId::new();
        let event = ProcEvent::Signal {
            to,
            from,
            data: serde_json::json!({"sdp": "offer", "candidates": [1, 2]}),
        };
        let json = serde_json::to_string(&event).expect("serialize proc event");
        let back: ProcEvent = serde_json::from_str(&json).expect("deserialize proc event");
        assert_eq!(back, event);
        assert_eq!(back.target(), to);
    }
}
