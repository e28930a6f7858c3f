//! # Distributed State Store
//!
//! The store is the sole authority for room existence and occupant
//! positions. Every mutating operation runs as one scripted transaction
//! inside the store, so concurrent callers on different processes can never
//! interleave partially: two joiners cannot pop the same free cell, and two
//! movers cannot both claim one target.
//!
//! Two backends implement the same [`RoomStore`] contract:
//!
//! - [`RedisRoomStore`] runs each operation as a Lua script over the `redis`
//!   crate's multiplexed async connection (production, multi-process).
//! - [`MemoryRoomStore`] applies the same semantics under one process-local
//!   lock (single-process deployments and tests).
//!
//! All operations are bounded by the configured request timeout and are
//! all-or-nothing; a timeout never leaves a transaction half-applied.

pub mod grid;
pub mod keys;
pub mod memory;
pub mod redis;
pub mod scripts;

pub use memory::MemoryRoomStore;
pub use redis::RedisRoomStore;

use crate::error::StoreError;
use crate::types::{Cell, OccupantRecord, ProcessId, RoomId, RoomSpec, SocketId, UserId};
use async_trait::async_trait;
use std::collections::HashMap;

/// Result of a move attempt.
///
/// Rejection is a normal outcome, not an error: the client predicted a step
/// the store would not accept (non-adjacent, blocked, or occupied target)
/// and needs the authoritative current cell to snap back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The move was accepted; the occupant now holds this cell.
    Moved(Cell),
    /// The move was refused; the occupant still holds this cell.
    Rejected(Cell),
}

/// Result of a successful remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The occupant left; others remain in the room.
    Departed,
    /// The occupant was the last one, and the room's keys were deleted in
    /// the same transaction. Rooms are never retained empty.
    RoomDeleted,
}

/// The distributed store contract.
///
/// One instance is created at process startup and injected into everything
/// that needs it; nothing constructs store connections lazily.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Creates the room from `spec` if its metadata key is absent (deriving
    /// the blocked set from the spec's object indices and the free set as
    /// grid minus blocked), then adds `user` exactly like
    /// [`add_occupant`](Self::add_occupant). If the room already exists the
    /// spec's geometry is ignored and this is a plain join.
    ///
    /// # Returns
    ///
    /// The cell assigned to the user, or the same failures as
    /// [`add_occupant`](Self::add_occupant) minus `RoomNotFound`. A creation
    /// whose add half fails is rolled back in the same transaction; no
    /// empty room is left behind.
    async fn create_or_join(
        &self,
        spec: &RoomSpec,
        user: &UserId,
        socket: SocketId,
        process: ProcessId,
    ) -> Result<Cell, StoreError>;

    /// Atomically pops one arbitrary cell from the room's free set into its
    /// occupied set, writes the occupant record, registers `user` in the
    /// occupant-id set, and records `socket` → `process` in the registry.
    ///
    /// # Returns
    ///
    /// The assigned cell. Fails `RoomNotFound` if the room is absent,
    /// `AlreadyPresent` if an occupant record exists for `(room, user)`,
    /// `RoomFull` if the free set is empty.
    async fn add_occupant(
        &self,
        room: &RoomId,
        user: &UserId,
        socket: SocketId,
        process: ProcessId,
    ) -> Result<Cell, StoreError>;

    /// Releases the occupant's cell back to the free set and deletes the
    /// record and the `socket` registry mapping. When the last occupant
    /// leaves, every key of the room is deleted in the same transaction.
    ///
    /// # Returns
    ///
    /// Whether the room survived the departure. Fails `RoomNotFound` /
    /// `OccupantNotFound` when there is nothing to remove.
    async fn remove_occupant(
        &self,
        room: &RoomId,
        user: &UserId,
        socket: SocketId,
    ) -> Result<RemoveOutcome, StoreError>;

    /// Attempts to move the occupant to `target`. Accepted only when the
    /// target is exactly one axis step from the current cell **and**
    /// currently free; acceptance swaps the two cells between occupied and
    /// free and updates the record atomically.
    ///
    /// # Returns
    ///
    /// [`MoveOutcome::Moved`] with the new cell, or
    /// [`MoveOutcome::Rejected`] with the unchanged current cell. Fails
    /// `RoomNotFound` / `OccupantNotFound`.
    async fn move_occupant(
        &self,
        room: &RoomId,
        user: &UserId,
        target: Cell,
    ) -> Result<MoveOutcome, StoreError>;

    /// Full occupant map of the room, or `RoomNotFound`.
    async fn list_occupants(
        &self,
        room: &RoomId,
    ) -> Result<HashMap<UserId, OccupantRecord>, StoreError>;

    /// Resolves the process currently owning a live connection, or `None`
    /// when the registry has no entry (socket already gone).
    async fn owner_process(&self, socket: SocketId) -> Result<Option<ProcessId>, StoreError>;
}
