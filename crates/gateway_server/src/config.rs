//! Gateway configuration types and defaults.
//!
//! This module contains the gateway configuration structure and default values
//! used to initialize and customize session handling behavior.

use huddle_room_system::ProximityConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Configuration structure for the gateway.
///
/// Contains all necessary parameters to configure gateway behavior including
/// network settings, connection limits and the proximity rules applied to the
/// rooms this process serves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// The socket address to bind the WebSocket listener to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent connections allowed
    pub max_connections: usize,

    /// Proximity rules (radius and peer cap) for room tasks
    pub proximity: ProximityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".parse().expect("Invalid default bind address"),
            max_connections: 1000,
            proximity: ProximityConfig::default(),
        }
    }
}
