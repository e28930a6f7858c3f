//! # Gateway Server - WebSocket Session Layer
//!
//! The client-facing edge of the huddle presence server. This crate owns
//! WebSocket connections and their room sessions while delegating all state
//! authority to the injected room store and all cross-process delivery to
//! the injected event bus.
//!
//! ## Design Philosophy
//!
//! The gateway holds **no authoritative state** - it only serves sessions:
//!
//! * **WebSocket connection management** - handshake, socket IDs, frame pumping
//! * **Verb handling** - room lifecycle, movement and WebRTC signaling verbs
//! * **Room tasks** - one task per locally-served room for ordered fan-out
//! * **Bus consumption** - applies relayed events and delivers proc messages
//!
//! Positions, occupancy and room existence live in the store; the gateway
//! keeps only disposable projections that can be reseeded from a snapshot
//! at any time.
//!
//! ## Architecture Overview
//!
//! ### Message Flow
//!
//! 1. Client sends a JSON frame whose `event` field names the verb
//! 2. The router parses it and dispatches to the verb's handler
//! 3. The handler verifies the token where required, runs the store
//!    transaction, and acknowledges with the authoritative outcome
//! 4. The resulting room event feeds this process's room task and is
//!    published to the room's channel for other processes
//! 5. Room tasks fan events out to local sockets and emit near/far
//!    transitions for locally-originated events
//!
//! ### Backends
//!
//! The store, bus and token verifier are injected at construction:
//! Redis-backed implementations for multi-process deployments, in-memory
//! twins for standalone runs and tests, HS256 JWT verification by default.
//!
//! ## Error Handling
//!
//! The gateway uses structured error types ([`GatewayError`]) to categorize
//! failures. Verb failures never tear a connection down; they are answered
//! with an `error` frame naming the verb, and only transport faults end the
//! connection.
//!
//! ## Thread Safety
//!
//! All components are designed for safe concurrent access:
//!
//! * Connection management uses `Arc<RwLock<HashMap>>` for shared state
//! * Each room's cache is owned by exactly one task and fed by a queue
//! * The store and bus contracts are `Send + Sync` trait objects

// Re-export core types and functions for easy access
pub use auth::{Claims, JwtVerifier, TokenVerifier};
pub use config::GatewayConfig;
pub use error::GatewayError;
pub use server::GatewayServer;
pub use utils::{create_standalone_gateway, create_standalone_gateway_with_config};

// Public module declarations
pub mod auth;
pub mod config;
pub mod error;
pub mod server;
pub mod utils;

// Internal modules (not part of public API)
mod connection;
mod messaging;
mod rooms;
mod tests;
