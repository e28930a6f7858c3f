//! Client connection representation.
//!
//! This module defines the structure of individual client connections,
//! tracking their identity and room session state.

use huddle_room_system::{RoomId, SocketId, UserId};
use std::net::SocketAddr;
use std::time::SystemTime;

/// An established room membership on one connection.
///
/// A connection holds at most one session at a time. The session is created
/// when a room verb succeeds and cleared on leave or disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// The authenticated user occupying the room
    pub user_id: UserId,

    /// The room the session belongs to
    pub room_id: RoomId,
}

/// Represents an individual client connection to the gateway.
///
/// This structure tracks the essential information about a connected client:
/// the socket ID minted at accept time, the room session once one is
/// established, the network address and connection timing.
#[derive(Debug)]
pub struct ClientConnection {
    /// The socket ID minted for this connection at accept time
    pub socket_id: SocketId,

    /// The active room session (None until a room verb succeeds)
    pub session: Option<Session>,

    /// The remote network address of the client
    pub remote_addr: SocketAddr,

    /// When this connection was established
    pub connected_at: SystemTime,
}

impl ClientConnection {
    /// Creates a new client connection with the specified remote address.
    ///
    /// The connection starts without a session and records the current time
    /// as the connection timestamp.
    pub fn new(socket_id: SocketId, remote_addr: SocketAddr) -> Self {
        Self {
            socket_id,
            session: None,
            remote_addr,
            connected_at: SystemTime::now(),
        }
    }
}
