//! Connection manager for tracking and managing client connections.
//!
//! This module provides the central management system for all client
//! connections, handling connection lifecycle, socket ID assignment, room
//! session state and message delivery.

use super::{
    client::{ClientConnection, Session},
    ConnectionId,
};
use crate::messaging::ServerMessage;
use huddle_room_system::{RoomId, SocketId, UserId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info};

/// Central manager for all client connections.
///
/// The `ConnectionManager` tracks active connections, mints their socket IDs,
/// holds their room sessions and provides message delivery through a shared
/// broadcast channel that every connection handler filters by its own ID.
///
/// # Architecture
///
/// * Uses `RwLock<HashMap>` for thread-safe connection storage
/// * Implements atomic connection ID generation
/// * Keeps a socket-to-connection index for wire-addressed delivery
/// * Provides a broadcast channel for outgoing messages
#[derive(Debug)]
pub struct ConnectionManager {
    /// Map of connection ID to client connection information
    connections: Arc<RwLock<HashMap<ConnectionId, ClientConnection>>>,

    /// Index from socket ID to the connection holding it
    sockets: Arc<RwLock<HashMap<SocketId, ConnectionId>>>,

    /// Atomic counter for generating unique connection IDs
    next_id: Arc<std::sync::atomic::AtomicUsize>,

    /// Broadcast sender for outgoing messages to specific connections
    sender: broadcast::Sender<(ConnectionId, Vec<u8>)>,
}

impl ConnectionManager {
    /// Creates a new connection manager.
    ///
    /// Initializes the internal data structures and broadcast channel
    /// with a reasonable buffer size for message queuing.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1000);
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            sockets: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(std::sync::atomic::AtomicUsize::new(1)),
            sender,
        }
    }

    /// Adds a new connection and returns its unique ID and fresh socket ID.
    ///
    /// The socket ID is the connection's identity on the wire and in the
    /// cross-process registry; the connection ID stays inside this process.
    pub async fn add_connection(&self, remote_addr: SocketAddr) -> (ConnectionId, SocketId) {
        let connection_id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let socket_id = SocketId::new();
        let connection = ClientConnection::new(socket_id, remote_addr);
        {
            let mut connections = self.connections.write().await;
            connections.insert(connection_id, connection);
        }
        {
            let mut sockets = self.sockets.write().await;
            sockets.insert(socket_id, connection_id);
        }
        info!(
            "🔗 Connection {} from {} (socket {})",
            connection_id, remote_addr, socket_id
        );
        (connection_id, socket_id)
    }

    /// Removes a connection from the manager.
    ///
    /// Cleans up the connection entry and its socket index entry and logs
    /// the disconnection. This should be called when a client disconnects.
    pub async fn remove_connection(&self, connection_id: ConnectionId) {
        let removed = {
            let mut connections = self.connections.write().await;
            connections.remove(&connection_id)
        };
        if let Some(connection) = removed {
            let mut sockets = self.sockets.write().await;
            sockets.remove(&connection.socket_id);
            drop(sockets);
            info!(
                "❌ Connection {} from {} disconnected",
                connection_id, connection.remote_addr
            );
        }
    }

    /// Records an established room session on a connection.
    pub async fn begin_session(&self, connection_id: ConnectionId, user_id: UserId, room_id: RoomId) {
        let mut connections = self.connections.write().await;
        if let Some(connection) = connections.get_mut(&connection_id) {
            connection.session = Some(Session { user_id, room_id });
        }
    }

    /// Clears and returns the session held by a connection, if any.
    ///
    /// Used by the leave verb and by disconnect handling, which both need
    /// to act on the session exactly once.
    pub async fn clear_session(&self, connection_id: ConnectionId) -> Option<Session> {
        let mut connections = self.connections.write().await;
        connections
            .get_mut(&connection_id)
            .and_then(|connection| connection.session.take())
    }

    /// Retrieves the session held by a connection, if any.
    pub async fn session(&self, connection_id: ConnectionId) -> Option<Session> {
        let connections = self.connections.read().await;
        connections
            .get(&connection_id)
            .and_then(|connection| connection.session.clone())
    }

    /// Retrieves the socket ID minted for a connection.
    pub async fn socket_id(&self, connection_id: ConnectionId) -> Option<SocketId> {
        let connections = self.connections.read().await;
        connections.get(&connection_id).map(|c| c.socket_id)
    }

    /// Finds the connection currently holding a socket ID.
    ///
    /// Returns `None` when the socket belongs to another process or has
    /// already disconnected.
    pub async fn connection_by_socket(&self, socket_id: SocketId) -> Option<ConnectionId> {
        let sockets = self.sockets.read().await;
        sockets.get(&socket_id).copied()
    }

    /// Sends raw bytes to a specific connection.
    ///
    /// Queues the frame for delivery through the internal broadcast channel;
    /// the connection's own handler picks it up and writes it to the socket.
    pub async fn send_to_connection(&self, connection_id: ConnectionId, message: Vec<u8>) {
        if let Err(e) = self.sender.send((connection_id, message)) {
            error!(
                "Failed to send message to connection {}: {:?}",
                connection_id, e
            );
        }
    }

    /// Serializes a server message and sends it to a specific connection.
    pub async fn send_message(&self, connection_id: ConnectionId, message: &ServerMessage) {
        match serde_json::to_vec(message) {
            Ok(bytes) => self.send_to_connection(connection_id, bytes).await,
            Err(e) => error!(
                "Failed to serialize message for connection {}: {}",
                connection_id, e
            ),
        }
    }

    /// Sends a server message to the connection holding a socket ID.
    ///
    /// Returns `false` when no local connection holds the socket, which
    /// tells the caller the socket lives on another process (or is gone).
    pub async fn send_message_to_socket(&self, socket_id: SocketId, message: &ServerMessage) -> bool {
        let Some(connection_id) = self.connection_by_socket(socket_id).await else {
            return false;
        };
        self.send_message(connection_id, message).await;
        true
    }

    /// Creates a new receiver for outgoing messages.
    ///
    /// Each connection handler should call this to get a receiver
    /// for messages targeted to their specific connection.
    pub fn subscribe(&self) -> broadcast::Receiver<(ConnectionId, Vec<u8>)> {
        self.sender.subscribe()
    }

    /// Returns the number of currently tracked connections.
    pub async fn connection_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
