//! # Core Type Definitions
//!
//! This module contains the fundamental types used throughout the huddle room
//! system. These types provide the building blocks for room representation,
//! occupant tracking, and grid positioning.
//!
//! ## Key Types
//!
//! - [`RoomId`] - Unique identifier for a room (the space id issued by the CRUD API)
//! - [`UserId`] - Unique identifier for a user, stable across reconnects
//! - [`SocketId`] - Unique identifier for one live client connection
//! - [`ProcessId`] - Unique identifier for one server process instance
//! - [`Cell`] - One discrete coordinate on a room's occupancy grid
//!
//! ## Design Principles
//!
//! - **Type Safety**: Wrapper types prevent ID confusion (UserId vs SocketId)
//! - **Store Compatibility**: cells render as `"x,y"` strings, the exact form
//!   kept in the store's cell sets
//! - **Serialization**: All types support JSON serialization for network
//!   transmission

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Identifier Types
// ============================================================================

/// Unique identifier for a room.
///
/// Rooms are addressed by the space id issued by the external CRUD API, so
/// this is a wrapper around an opaque string rather than a UUID generated
/// here. The wrapper prevents room ids from being confused with user ids in
/// the system.
///
/// # Examples
///
/// ```rust
/// use huddle_room_system::RoomId;
///
/// let room_id = RoomId::from("team-standup");
/// println!("Room: {}", room_id);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(pub String);

impl RoomId {
    /// Returns the room id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RoomId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a user.
///
/// User ids are issued by the external account system and arrive inside
/// verified token claims. They are stable across reconnects, which is what
/// lets the store enforce at most one occupant record per `(room, user)`.
///
/// # Examples
///
/// ```rust
/// use huddle_room_system::UserId;
///
/// let user_id = UserId::from("u-42");
/// println!("User: {}", user_id);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    /// Returns the user id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for one live client connection.
///
/// A fresh socket id is minted for every accepted connection, so a user who
/// reconnects gets a new one while keeping the same [`UserId`]. Socket ids
/// are what peers address WebRTC signaling to, and what the process registry
/// maps to an owning process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SocketId(pub Uuid);

impl SocketId {
    /// Creates a new random socket id using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a socket id from a string representation.
    ///
    /// # Arguments
    ///
    /// * `s` - A string slice containing a valid UUID
    ///
    /// # Returns
    ///
    /// Returns `Ok(SocketId)` if the string is a valid UUID, otherwise
    /// returns `Err(uuid::Error)` with details about the parsing failure.
    pub fn from_str(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::str::FromStr for SocketId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str(s)
    }
}

impl Default for SocketId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SocketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for one server process instance.
///
/// Minted once at startup and written into the process registry for every
/// connection the process owns. Cross-process messages are routed by
/// publishing to the channel derived from this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessId(pub Uuid);

impl ProcessId {
    /// Creates a new random process id using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a process id from a string representation.
    pub fn from_str(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::str::FromStr for ProcessId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str(s)
    }
}

impl Default for ProcessId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Grid Types
// ============================================================================

/// One discrete coordinate on a room's occupancy grid.
///
/// Coordinates are 1-based: `x` runs from 1 to the room's width and `y` from
/// 1 to its height. Every cell belongs to exactly one of the room's three
/// disjoint sets (blocked, free, occupied) at all times.
///
/// # Examples
///
/// ```rust
/// use huddle_room_system::Cell;
///
/// let spawn = Cell::new(3, 1);
/// assert_eq!(spawn.to_string(), "3,1");
/// assert_eq!(Cell::parse("3,1"), Some(spawn));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    /// Column, 1..=width
    pub x: u32,
    /// Row, 1..=height
    pub y: u32,
}

impl Cell {
    /// Creates a new cell with the specified coordinates.
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Parses a cell from the `"x,y"` form used by the store's cell sets.
    ///
    /// Returns `None` when the string is not two comma-separated positive
    /// integers.
    pub fn parse(s: &str) -> Option<Self> {
        let (x, y) = s.split_once(',')?;
        let x = x.trim().parse().ok()?;
        let y = y.trim().parse().ok()?;
        Some(Self { x, y })
    }

    /// Calculates the Euclidean distance to another cell.
    ///
    /// This is the metric the proximity engine ranks neighbors by.
    pub fn distance(&self, other: Cell) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        (dx * dx + dy * dy).sqrt()
    }

    /// Calculates the Manhattan distance to another cell.
    ///
    /// A move is only legal when this is exactly 1 (one axis step).
    pub fn manhattan(&self, other: Cell) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

// ============================================================================
// Room Types
// ============================================================================

/// Everything needed to initialize a room on first create-or-join.
///
/// The static-object index list comes from the map editor: each 1-based
/// index marks one permanently blocked cell, laid out row-major across the
/// grid (see [`crate::store::grid`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSpec {
    /// Room (space) id the clients will address.
    pub room_id: RoomId,
    /// Human-readable room name, kept in room metadata.
    pub name: String,
    /// Grid width in cells.
    pub width: u32,
    /// Grid height in cells.
    pub height: u32,
    /// 1-based indices of permanently blocked cells.
    pub object_indices: Vec<u32>,
}

/// One occupant as reported by the store: position plus the socket currently
/// carrying the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupantRecord {
    /// Current cell.
    pub cell: Cell,
    /// The live connection owning this occupant.
    pub socket_id: SocketId,
}

impl OccupantRecord {
    /// Creates a new occupant record.
    pub fn new(cell: Cell, socket_id: SocketId) -> Self {
        Self { cell, socket_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_round_trips_through_store_form() {
        let cell = Cell::new(7, 12);
        assert_eq!(Cell::parse(&cell.to_string()), Some(cell));
    }

    #[test]
    fn cell_parse_rejects_garbage() {
        assert_eq!(Cell::parse(""), None);
        assert_eq!(Cell::parse("3"), None);
        assert_eq!(Cell::parse("a,b"), None);
        assert_eq!(Cell::parse("-1,2"), None);
    }

    #[test]
    fn manhattan_is_one_for_axis_neighbors_only() {
        let origin = Cell::new(3, 3);
        assert_eq!(origin.manhattan(Cell::new(4, 3)), 1);
        assert_eq!(origin.manhattan(Cell::new(3, 2)), 1);
        assert_eq!(origin.manhattan(Cell::new(4, 4)), 2);
        assert_eq!(origin.manhattan(origin), 0);
    }

    #[test]
    fn distance_is_euclidean() {
        let a = Cell::new(1, 1);
        let b = Cell::new(4, 5);
        assert!((a.distance(b) - 5.0).abs() < f64::EPSILON);
    }
}
