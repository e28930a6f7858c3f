//! Utility functions and helper methods for the gateway.
//!
//! This module provides convenient factory functions for creating gateway
//! instances backed by the in-memory store and bus, which is how
//! single-process deployments and tests set one up.

use crate::{auth::JwtVerifier, config::GatewayConfig, server::GatewayServer};
use huddle_room_system::{LocalEventBus, MemoryRoomStore, ProcessId};
use std::sync::Arc;

/// Creates a standalone gateway with default configuration.
///
/// Standalone means single-process: room state lives in a
/// [`MemoryRoomStore`] and events ride a [`LocalEventBus`], so nothing
/// external is required. Tokens are verified against the given secret.
///
/// # Example
///
/// ```rust
/// use gateway_server::create_standalone_gateway;
///
/// let server = create_standalone_gateway("shared-secret");
/// ```
pub fn create_standalone_gateway(token_secret: &str) -> GatewayServer {
    create_standalone_gateway_with_config(GatewayConfig::default(), token_secret)
}

/// Creates a standalone gateway with custom configuration.
///
/// # Example
///
/// ```rust
/// use gateway_server::{create_standalone_gateway_with_config, GatewayConfig};
///
/// let config = GatewayConfig {
///     bind_address: "0.0.0.0:9000".parse().unwrap(),
///     max_connections: 5000,
///     ..Default::default()
/// };
///
/// let server = create_standalone_gateway_with_config(config, "shared-secret");
/// ```
pub fn create_standalone_gateway_with_config(
    config: GatewayConfig,
    token_secret: &str,
) -> GatewayServer {
    let process_id = ProcessId::new();
    GatewayServer::new(
        config,
        Arc::new(MemoryRoomStore::new()),
        Arc::new(LocalEventBus::new(process_id)),
        Arc::new(JwtVerifier::new(token_secret)),
        process_id,
    )
}
