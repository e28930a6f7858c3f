//! # Huddle Room System
//!
//! Shared-state coordination core for the huddle presence server: the
//! distributed room store, the per-process room cache with its proximity
//! engine, and the cross-process event bus.
//!
//! ## Core Features
//!
//! - **Atomic Occupancy**: every room mutation runs as one scripted store
//!   transaction, so concurrent processes can never assign one cell twice
//! - **Disjoint Grid Partition**: each cell is always exactly one of
//!   blocked, free, or occupied
//! - **Bounded Proximity**: distance-ranked neighbor sets capped at K
//!   within radius R, diffed into explicit near/far transitions
//! - **Two-Tier Channels**: room channels for lifecycle fan-out, process
//!   channels for point-to-point signaling and remote notifications
//! - **Swappable Backends**: Redis store/bus for multi-process
//!   deployments, in-memory twins for single-instance runs and tests
//!
//! ## Architecture Overview
//!
//! The store ([`RoomStore`]) is the sole authority for room existence and
//! occupant positions. Caches ([`RoomCache`]) are disposable projections
//! fed by the bus ([`EventBus`]); they answer "who is here" and drive the
//! proximity engine, never validation. The process registry inside the
//! store maps each live socket to its owning process so point-to-point
//! messages can be routed when endpoints are not co-located.
//!
//! ## Quick Start Example
//!
//! ```rust,no_run
//! use huddle_room_system::{
//!     EventBus, LocalEventBus, MemoryRoomStore, ProcessId, RoomId, RoomSpec,
//!     RoomStore, SocketId, UserId,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let process_id = ProcessId::new();
//!     let store = MemoryRoomStore::new();
//!     let bus = LocalEventBus::new(process_id);
//!     let _incoming = bus.subscribe().await?;
//!
//!     let spec = RoomSpec {
//!         room_id: RoomId::from("lobby"),
//!         name: "Lobby".to_string(),
//!         width: 8,
//!         height: 6,
//!         object_indices: vec![3, 4],
//!     };
//!     let spawn = store
//!         .create_or_join(&spec, &UserId::from("u-1"), SocketId::new(), process_id)
//!         .await?;
//!     println!("spawned at {spawn}");
//!     Ok(())
//! }
//! ```


// Core modules
pub mod bus;
pub mod cache;
pub mod error;
pub mod events;
pub mod proximity;
pub mod store;
pub mod types;

// Re-export commonly used items for convenience
pub use bus::{
    proc_channel, room_channel, BusMessage, EventBus, LocalEventBus, RedisEventBus,
    ROOM_CHANNEL_PATTERN,
};
pub use cache::RoomCache;
pub use error::{BusError, StoreError};
pub use events::{ProcEvent, RoomEvent};
pub use proximity::{Neighbor, ProximityConfig, Transitions};
pub use store::{MemoryRoomStore, MoveOutcome, RedisRoomStore, RemoveOutcome, RoomStore};
pub use types::*;

// External dependencies the gateway commonly needs alongside these types
pub use async_trait::async_trait;
