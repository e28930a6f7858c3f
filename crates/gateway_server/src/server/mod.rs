//! Core gateway implementation and connection handling.
//!
//! This module contains the main gateway structure and the logic for
//! handling client connections, verb dispatch and gateway lifecycle
//! management.

pub mod core;
pub mod handlers;

pub use core::GatewayServer;
