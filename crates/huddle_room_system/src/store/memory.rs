//! In-memory backend for the distributed store.
//!
//! Holds the same state the Redis backend keeps in its key schema, applied
//! under one async mutex so every operation is exactly as atomic as its Lua
//! counterpart. This is the backend for single-process deployments and for
//! tests; it has no cross-process visibility by construction.

use super::{grid, MoveOutcome, RemoveOutcome, RoomStore};
use crate::error::StoreError;
use crate::types::{Cell, OccupantRecord, ProcessId, RoomId, RoomSpec, SocketId, UserId};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

#[derive(Debug)]
struct MemRoom {
    #[allow(dead_code)]
    name: String,
    #[allow(dead_code)]
    creator: UserId,
    width: u32,
    height: u32,
    blocked: HashSet<Cell>,
    free: HashSet<Cell>,
    occupied: HashSet<Cell>,
    occupants: HashMap<UserId, OccupantRecord>,
}

#[derive(Debug, Default)]
struct StoreInner {
    rooms: HashMap<RoomId, MemRoom>,
    registry: HashMap<SocketId, ProcessId>,
}

/// Store implementation holding all state in process memory.
#[derive(Debug, Default)]
pub struct MemoryRoomStore {
    inner: Mutex<StoreInner>,
}

impl MemoryRoomStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomStore for MemoryRoomStore {
    async fn create_or_join(
        &self,
        spec: &RoomSpec,
        user: &UserId,
        socket: SocketId,
        process: ProcessId,
    ) -> Result<Cell, StoreError> {
        let mut inner = self.inner.lock().await;
        let created = !inner.rooms.contains_key(&spec.room_id);
        if created {
            let blocked = grid::blocked_cells(spec.width, spec.height, &spec.object_indices);
            let free = grid::free_cells(spec.width, spec.height, &blocked);
            inner.rooms.insert(
                spec.room_id.clone(),
                MemRoom {
                    name: spec.name.clone(),
                    creator: user.clone(),
                    width: spec.width,
                    height: spec.height,
                    blocked,
                    free,
                    occupied: HashSet::new(),
                    occupants: HashMap::new(),
                },
            );
        }
        let result = add_locked(&mut inner, &spec.room_id, user, socket, process);
        // A creation whose add half fails (no spawnable cell) rolls back in
        // the same critical section; rooms are never retained empty.
        if created && result.is_err() {
            inner.rooms.remove(&spec.room_id);
        }
        result
    }

    async fn add_occupant(
        &self,
        room: &RoomId,
        user: &UserId,
        socket: SocketId,
        process: ProcessId,
    ) -> Result<Cell, StoreError> {
        let mut inner = self.inner.lock().await;
        add_locked(&mut inner, room, user, socket, process)
    }

    async fn remove_occupant(
        &self,
        room: &RoomId,
        user: &UserId,
        socket: SocketId,
    ) -> Result<RemoveOutcome, StoreError> {
        let mut inner = self.inner.lock().await;
        let state = inner
            .rooms
            .get_mut(room)
            .ok_or_else(|| StoreError::RoomNotFound(room.clone()))?;
        let record = state
            .occupants
            .remove(user)
            .ok_or_else(|| StoreError::OccupantNotFound {
                room: room.clone(),
                user: user.clone(),
            })?;
        state.occupied.remove(&record.cell);
        state.free.insert(record.cell);
        let emptied = state.occupants.is_empty();
        if emptied {
            inner.rooms.remove(room);
        }
        inner.registry.remove(&socket);
        Ok(if emptied {
            RemoveOutcome::RoomDeleted
        } else {
            RemoveOutcome::Departed
        })
    }

    async fn move_occupant(
        &self,
        room: &RoomId,
        user: &UserId,
        target: Cell,
    ) -> Result<MoveOutcome, StoreError> {
        let mut inner = self.inner.lock().await;
        let state = inner
            .rooms
            .get_mut(room)
            .ok_or_else(|| StoreError::RoomNotFound(room.clone()))?;
        let current = state
            .occupants
            .get(user)
            .ok_or_else(|| StoreError::OccupantNotFound {
                room: room.clone(),
                user: user.clone(),
            })?
            .cell;
        if current.manhattan(target) != 1 || !state.free.contains(&target) {
            return Ok(MoveOutcome::Rejected(current));
        }
        state.free.remove(&target);
        state.occupied.insert(target);
        state.occupied.remove(&current);
        state.free.insert(current);
        if let Some(record) = state.occupants.get_mut(user) {
            record.cell = target;
        }
        Ok(MoveOutcome::Moved(target))
    }

    async fn list_occupants(
        &self,
        room: &RoomId,
    ) -> Result<HashMap<UserId, OccupantRecord>, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .rooms
            .get(room)
            .map(|state| state.occupants.clone())
            .ok_or_else(|| StoreError::RoomNotFound(room.clone()))
    }

    async fn owner_process(&self, socket: SocketId) -> Result<Option<ProcessId>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.registry.get(&socket).copied())
    }
}

/// The add half shared by `add_occupant` and `create_or_join`, run while the
/// store lock is held.
fn add_locked(
    inner: &mut StoreInner,
    room_id: &RoomId,
    user: &UserId,
    socket: SocketId,
    process: ProcessId,
) -> Result<Cell, StoreError> {
    let state = inner
        .rooms
        .get_mut(room_id)
        .ok_or_else(|| StoreError::RoomNotFound(room_id.clone()))?;
    if state.occupants.contains_key(user) {
        return Err(StoreError::AlreadyPresent {
            room: room_id.clone(),
            user: user.clone(),
        });
    }
    // Arbitrary pick, the same contract as SPOP on the free set.
    let cell = state
        .free
        .iter()
        .next()
        .copied()
        .ok_or_else(|| StoreError::RoomFull(room_id.clone()))?;
    state.free.remove(&cell);
    state.occupied.insert(cell);
    state
        .occupants
        .insert(user.clone(), OccupantRecord::new(cell, socket));
    inner.registry.insert(socket, process);
    Ok(cell)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(room: &str, width: u32, height: u32, objects: Vec<u32>) -> RoomSpec {
        RoomSpec {
            room_id: RoomId::from(room),
            name: format!("{room} name"),
            width,
            height,
            object_indices: objects,
        }
    }

    #[tokio::test]
    async fn partition_holds_through_add_move_remove() {
        let store = MemoryRoomStore::new();
        let process = ProcessId::new();
        let spec = spec("r", 4, 3, vec![2, 5]);
        let alice_socket = SocketId::new();

        let spawn = store
            .create_or_join(&spec, &UserId::from("alice"), alice_socket, process)
            .await
            .expect("create room");

        // Walk alice one legal step if any axis neighbor is free.
        let neighbors = [
            Cell::new(spawn.x + 1, spawn.y),
            Cell::new(spawn.x, spawn.y + 1),
        ];
        for target in neighbors {
            let _ = store
                .move_occupant(&RoomId::from("r"), &UserId::from("alice"), target)
                .await
                .expect("move attempt");
        }

        {
            let inner = store.inner.lock().await;
            let state = inner.rooms.get(&RoomId::from("r")).expect("room state");
            let total = (state.width * state.height) as usize;
            assert_eq!(
                state.blocked.len() + state.free.len() + state.occupied.len(),
                total
            );
            assert!(state.blocked.is_disjoint(&state.free));
            assert!(state.blocked.is_disjoint(&state.occupied));
            assert!(state.free.is_disjoint(&state.occupied));
            assert_eq!(state.occupied.len(), state.occupants.len());
        }

        let outcome = store
            .remove_occupant(&RoomId::from("r"), &UserId::from("alice"), alice_socket)
            .await
            .expect("remove occupant");
        assert_eq!(outcome, RemoveOutcome::RoomDeleted);
        assert!(store.inner.lock().await.rooms.is_empty());
    }

    #[tokio::test]
    async fn registry_tracks_live_sockets() {
        let store = MemoryRoomStore::new();
        let process = ProcessId::new();
        let socket = SocketId::new();
        let spec = spec("r", 2, 2, vec![]);

        store
            .create_or_join(&spec, &UserId::from("u"), socket, process)
            .await
            .expect("create room");
        assert_eq!(
            store.owner_process(socket).await.expect("owner lookup"),
            Some(process)
        );

        store
            .remove_occupant(&RoomId::from("r"), &UserId::from("u"), socket)
            .await
            .expect("remove occupant");
        assert_eq!(store.owner_process(socket).await.expect("owner lookup"), None);
    }
}
