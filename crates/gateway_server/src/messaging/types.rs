//! Message type definitions for client-server communication.
//!
//! This module defines the structure of messages exchanged between clients
//! and the gateway. Every frame is a JSON object whose `event` field names
//! the verb or notification; the remaining fields are the payload.

use huddle_room_system::{Cell, RoomId, SocketId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A verb sent from a client to the gateway.
///
/// Room lifecycle verbs carry the signed token and the space they target;
/// movement and signaling ride on the established session instead.
///
/// # Examples
///
/// Creating a room:
/// ```json
/// {
///   "event": "room:create",
///   "token": "<jwt>",
///   "name": "standup",
///   "width": 10,
///   "height": 8,
///   "spaceId": "space-42",
///   "objectsArray": [3, 4, 13, 14]
/// }
/// ```
///
/// Moving within it:
/// ```json
/// { "event": "player:move", "position": { "x": 4, "y": 2 } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ClientVerb {
    /// Create the space if missing, then enter it
    #[serde(rename = "room:create", rename_all = "camelCase")]
    RoomCreate {
        token: String,
        name: String,
        width: u32,
        height: u32,
        space_id: String,
        objects_array: Vec<u32>,
    },

    /// Enter an existing space
    #[serde(rename = "room:join", rename_all = "camelCase")]
    RoomJoin { token: String, space_id: String },

    /// Step to an adjacent cell
    #[serde(rename = "player:move", rename_all = "camelCase")]
    PlayerMove { position: Cell },

    /// Leave the space explicitly
    #[serde(rename = "room:leave", rename_all = "camelCase")]
    RoomLeave { token: String, space_id: String },

    /// Relay an opaque signaling payload to another socket
    #[serde(rename = "webrtc-signal")]
    WebrtcSignal { to: SocketId, data: serde_json::Value },
}

impl ClientVerb {
    /// The wire name of the verb, used when reporting failures back.
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientVerb::RoomCreate { .. } => "room:create",
            ClientVerb::RoomJoin { .. } => "room:join",
            ClientVerb::PlayerMove { .. } => "player:move",
            ClientVerb::RoomLeave { .. } => "room:leave",
            ClientVerb::WebrtcSignal { .. } => "webrtc-signal",
        }
    }
}

/// Outcome marker carried by acknowledgements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Success,
    /// The verb was understood but refused; the payload carries the
    /// authoritative state (a rejected move returns the current cell)
    Rejected,
}

/// One occupant's state as handed to a joining client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub position: Cell,
    pub socket_id: SocketId,
}

/// A message sent from the gateway to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ServerMessage {
    /// Acknowledges `room:create` with the assigned spawn cell
    #[serde(rename = "room:created", rename_all = "camelCase")]
    RoomCreated {
        status: AckStatus,
        player_id: UserId,
        room_id: RoomId,
        spawn: Cell,
    },

    /// Acknowledges `room:join` with the current occupant roster
    #[serde(rename = "room:joined", rename_all = "camelCase")]
    RoomJoined {
        status: AckStatus,
        player_id: UserId,
        players: HashMap<UserId, PlayerState>,
        spawn: Cell,
    },

    /// Acknowledges `player:move`; a rejection carries the current cell
    #[serde(rename = "player:move", rename_all = "camelCase")]
    MoveAck { status: AckStatus, position: Cell },

    /// Acknowledges `room:leave`
    #[serde(rename = "room:leave", rename_all = "camelCase")]
    LeaveAck { status: AckStatus, player_id: UserId },

    /// A player entered the room
    #[serde(rename = "player:joined", rename_all = "camelCase")]
    PlayerJoined {
        player_id: UserId,
        position: Cell,
        socket_id: SocketId,
    },

    /// A player stepped to a new cell
    #[serde(rename = "player:moved", rename_all = "camelCase")]
    PlayerMoved { player_id: UserId, position: Cell },

    /// A player left the room
    #[serde(rename = "player:left", rename_all = "camelCase")]
    PlayerLeft { player_id: UserId },

    /// A peer entered signaling range; carries the socket to signal to
    #[serde(rename = "player-near", rename_all = "camelCase")]
    PlayerNear { player_id: UserId, socket_id: SocketId },

    /// A previously near peer moved out of range
    #[serde(rename = "player-far", rename_all = "camelCase")]
    PlayerFar { player_id: UserId, socket_id: SocketId },

    /// A relayed signaling payload from another socket
    #[serde(rename = "webrtc-signal")]
    WebrtcSignal { from: SocketId, data: serde_json::Value },

    /// A verb failed; `source` names the verb that failed, so the client
    /// can correlate the failure with what it sent
    #[serde(rename = "error")]
    Error { source: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn room_create_parses_from_the_wire() {
        let frame = json!({
            "event": "room:create",
            "token": "tok",
            "name": "standup",
            "width": 10,
            "height": 8,
            "spaceId": "space-42",
            "objectsArray": [3, 4]
        });

        let verb: ClientVerb =
            serde_json::from_value(frame).expect("Frame should parse");
        match verb {
            ClientVerb::RoomCreate {
                width,
                height,
                space_id,
                objects_array,
                ..
            } => {
                assert_eq!(width, 10);
                assert_eq!(height, 8);
                assert_eq!(space_id, "space-42");
                assert_eq!(objects_array, vec![3, 4]);
            }
            other => panic!("Parsed the wrong verb: {other:?}"),
        }
    }

    #[test]
    fn player_move_parses_its_position() {
        let frame = json!({ "event": "player:move", "position": { "x": 4, "y": 2 } });

        let verb: ClientVerb =
            serde_json::from_value(frame).expect("Frame should parse");
        assert!(matches!(
            verb,
            ClientVerb::PlayerMove { position } if position == Cell::new(4, 2)
        ));
    }

    #[test]
    fn unknown_events_fail_to_parse() {
        let frame = json!({ "event": "room:destroy", "spaceId": "space-1" });
        assert!(serde_json::from_value::<ClientVerb>(frame).is_err());
    }

    #[test]
    fn proximity_notifications_use_kebab_case_events() {
        let socket = SocketId::new();
        let message = ServerMessage::PlayerNear {
            player_id: UserId::from("user-1"),
            socket_id: socket,
        };

        let value = serde_json::to_value(&message).expect("Message should serialize");
        assert_eq!(value["event"], "player-near");
        assert_eq!(value["playerId"], "user-1");
        assert_eq!(value["socketId"], socket.to_string());
    }

    #[test]
    fn rejected_move_acks_carry_the_corrective_position() {
        let message = ServerMessage::MoveAck {
            status: AckStatus::Rejected,
            position: Cell::new(3, 1),
        };

        let value = serde_json::to_value(&message).expect("Message should serialize");
        assert_eq!(value["event"], "player:move");
        assert_eq!(value["status"], "rejected");
        assert_eq!(value["position"]["x"], 3);
        assert_eq!(value["position"]["y"], 1);
    }

    #[test]
    fn error_frames_name_their_source_verb() {
        let message = ServerMessage::Error {
            source: "room:join".to_string(),
            message: "Room not found: space-1".to_string(),
        };

        let value = serde_json::to_value(&message).expect("Message should serialize");
        assert_eq!(value["event"], "error");
        assert_eq!(value["source"], "room:join");
        assert_eq!(value["message"], "Room not found: space-1");
    }

    #[test]
    fn join_acks_key_the_roster_by_user_id() {
        let socket = SocketId::new();
        let mut players = HashMap::new();
        players.insert(
            UserId::from("user-1"),
            PlayerState {
                position: Cell::new(2, 2),
                socket_id: socket,
            },
        );
        let message = ServerMessage::RoomJoined {
            status: AckStatus::Success,
            player_id: UserId::from("user-2"),
            players,
            spawn: Cell::new(1, 1),
        };

        let value = serde_json::to_value(&message).expect("Message should serialize");
        assert_eq!(value["event"], "room:joined");
        assert_eq!(value["players"]["user-1"]["position"]["x"], 2);
        assert_eq!(value["players"]["user-1"]["socketId"], socket.to_string());
        assert_eq!(value["spawn"]["y"], 1);
    }
}
