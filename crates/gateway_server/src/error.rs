//! Error types and handling for the gateway.
//!
//! This module defines the error types that can occur while serving client
//! sessions, providing clear categorization of different failure modes.

use huddle_room_system::{BusError, StoreError};

/// Enumeration of possible gateway errors.
///
/// Categorizes errors into network, authentication and backend failures to
/// help with debugging and error handling. Malformed client frames are not
/// represented here: they are answered on the wire and never propagate as
/// errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Network-related errors such as binding failures or handshake issues
    #[error("Network error: {0}")]
    Network(String),

    /// Token verification failures
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Errors raised by the distributed room store
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Errors raised by the event fabric
    #[error(transparent)]
    Bus(#[from] BusError),
}
