//! Store key schema.
//!
//! Every key the system writes lives here, so the Lua scripts, the Redis
//! backend, and the tests all agree on one layout:
//!
//! | key | kind | content |
//! |---|---|---|
//! | `room:R` | hash | name, width, height, creatorId |
//! | `room:R:blocked` | set | `"x,y"` cells of static geometry |
//! | `room:R:free` | set | `"x,y"` cells open for spawning/moves |
//! | `room:R:occupied` | set | `"x,y"` cells held by occupants |
//! | `room:R:occupants` | set | user ids present in the room |
//! | `room:R:occupant:U` | hash | x, y, socketId |
//! | `conn:S` | string | process id owning live socket S |

use crate::types::{RoomId, SocketId, UserId};

/// Room metadata hash.
pub fn room_meta(room: &RoomId) -> String {
    format!("room:{room}")
}

/// Set of permanently blocked cells.
pub fn room_blocked(room: &RoomId) -> String {
    format!("room:{room}:blocked")
}

/// Set of currently free cells.
pub fn room_free(room: &RoomId) -> String {
    format!("room:{room}:free")
}

/// Set of currently occupied cells.
pub fn room_occupied(room: &RoomId) -> String {
    format!("room:{room}:occupied")
}

/// Set of user ids present in the room.
pub fn room_occupants(room: &RoomId) -> String {
    format!("room:{room}:occupants")
}

/// One occupant's record hash.
pub fn room_occupant(room: &RoomId, user: &UserId) -> String {
    format!("room:{room}:occupant:{user}")
}

/// Registry entry mapping a live connection to its owning process.
pub fn conn_owner(socket: SocketId) -> String {
    format!("conn:{socket}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_the_documented_layout() {
        let room = RoomId::from("r-9");
        let user = UserId::from("u-3");
        assert_eq!(room_meta(&room), "room:r-9");
        assert_eq!(room_blocked(&room), "room:r-9:blocked");
        assert_eq!(room_free(&room), "room:r-9:free");
        assert_eq!(room_occupied(&room), "room:r-9:occupied");
        assert_eq!(room_occupants(&room), "room:r-9:occupants");
        assert_eq!(room_occupant(&room, &user), "room:r-9:occupant:u-3");

        let socket = SocketId::new();
        assert_eq!(conn_owner(socket), format!("conn:{socket}"));
    }
}
