//! Error types for the room system.
//!
//! This module defines the failure modes of the distributed store and the
//! event bus, categorized so the gateway can translate each one into the
//! right client-visible acknowledgement.

use crate::types::{RoomId, UserId};

/// Enumeration of distributed store failures.
///
/// The first four variants are domain outcomes a client can trigger; the
/// remaining two mean the store itself misbehaved. Move rejection is not an
/// error (see [`crate::store::MoveOutcome`]), so it does not appear here.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The addressed room has no metadata key (never created, or already
    /// deleted when its last occupant left).
    #[error("Room not found: {0}")]
    RoomNotFound(RoomId),

    /// The room's free set is empty, so there is no cell to assign.
    #[error("Room is full: {0}")]
    RoomFull(RoomId),

    /// An occupant record already exists for this (room, user) pair.
    #[error("User {user} is already present in room {room}")]
    AlreadyPresent { room: RoomId, user: UserId },

    /// No occupant record exists for this (room, user) pair.
    #[error("User {user} is not present in room {room}")]
    OccupantNotFound { room: RoomId, user: UserId },

    /// The store could not be reached, or did not answer within the request
    /// timeout. Scripted transactions are all-or-nothing, so nothing was
    /// partially applied.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store answered with data this process cannot interpret.
    #[error("Malformed store reply: {0}")]
    Decode(String),
}

impl StoreError {
    /// True for the domain outcomes a well-formed client request can hit,
    /// false for infrastructure failures worth operator attention.
    pub fn is_domain(&self) -> bool {
        !matches!(self, StoreError::Unavailable(_) | StoreError::Decode(_))
    }
}

/// Enumeration of event bus failures.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// A publish could not be handed to the fabric.
    #[error("Publish failed: {0}")]
    Publish(String),

    /// The subscription side of the bus is gone; the process should shut
    /// down rather than serve from a frozen cache.
    #[error("Bus subscription closed: {0}")]
    Closed(String),
}
