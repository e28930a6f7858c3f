//! Message handling and routing for client-server communication.
//!
//! This module provides the infrastructure for parsing incoming client verbs
//! and dispatching them to their handlers, plus the typed wire messages the
//! gateway sends back.

pub mod router;
pub mod types;

pub use router::route_client_message;
pub use types::{AckStatus, ClientVerb, PlayerState, ServerMessage};
