//! Connection management for client connections.
//!
//! This module handles the lifecycle of client connections, including
//! connection tracking, socket ID assignment, session state and message
//! routing.

pub mod client;
pub mod manager;

pub use manager::ConnectionManager;

/// Type alias for connection identifiers.
///
/// Connection IDs are used to uniquely identify client connections
/// throughout their lifecycle on this process. They never leave the
/// process; the cross-process identity of a connection is its socket ID.
pub type ConnectionId = usize;
