//! Redis backend for the distributed store.
//!
//! One multiplexed async connection is created at process startup and shared
//! by value (the connection is a cheap clone around one socket); every
//! operation invokes its Lua script through it. All calls are bounded by the
//! configured request timeout so a dead store turns into a fast
//! [`StoreError::Unavailable`] instead of a hang, and because each script is
//! atomic a timeout never leaves partial effects behind.

use super::{grid, keys, scripts, MoveOutcome, RemoveOutcome, RoomStore};
use crate::error::StoreError;
use crate::types::{Cell, OccupantRecord, ProcessId, RoomId, RoomSpec, SocketId, UserId};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Store implementation backed by Redis scripted transactions.
pub struct RedisRoomStore {
    conn: MultiplexedConnection,
    request_timeout: Duration,
    create_or_join: Script,
    add_occupant: Script,
    remove_occupant: Script,
    move_occupant: Script,
    list_occupants: Script,
}

impl RedisRoomStore {
    /// Connects to the store at `url` and prepares all operation scripts.
    ///
    /// The connection attempt itself is bounded by `request_timeout`; a
    /// store that cannot be reached at startup is a startup failure, not
    /// something to retry lazily later.
    pub async fn connect(url: &str, request_timeout: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)
            .map_err(|e| StoreError::Unavailable(format!("invalid store url: {e}")))?;
        let conn = match tokio::time::timeout(
            request_timeout,
            client.get_multiplexed_async_connection(),
        )
        .await
        {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(StoreError::Unavailable(format!("store connect: {e}"))),
            Err(_) => {
                return Err(StoreError::Unavailable(format!(
                    "store connect timed out after {request_timeout:?}"
                )))
            }
        };
        info!("🗄️ Connected to room store at {}", url);
        Ok(Self::with_connection(conn, request_timeout))
    }

    /// Wraps an already-established connection (startup code that also needs
    /// the pub/sub side opens the client once and hands the connection in).
    pub fn with_connection(conn: MultiplexedConnection, request_timeout: Duration) -> Self {
        Self {
            conn,
            request_timeout,
            create_or_join: Script::new(scripts::CREATE_OR_JOIN),
            add_occupant: Script::new(scripts::ADD_OCCUPANT),
            remove_occupant: Script::new(scripts::REMOVE_OCCUPANT),
            move_occupant: Script::new(scripts::MOVE_OCCUPANT),
            list_occupants: Script::new(scripts::LIST_OCCUPANTS),
        }
    }

    /// Runs one store call under the request timeout.
    async fn bounded<T, F>(&self, what: &str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!("❌ Store request '{}' failed: {}", what, e);
                Err(StoreError::Unavailable(format!("{what}: {e}")))
            }
            Err(_) => {
                warn!(
                    "❌ Store request '{}' timed out after {:?}",
                    what, self.request_timeout
                );
                Err(StoreError::Unavailable(format!(
                    "{what} timed out after {:?}",
                    self.request_timeout
                )))
            }
        }
    }
}

#[async_trait]
impl RoomStore for RedisRoomStore {
    async fn create_or_join(
        &self,
        spec: &RoomSpec,
        user: &UserId,
        socket: SocketId,
        process: ProcessId,
    ) -> Result<Cell, StoreError> {
        let room = &spec.room_id;
        let mut invocation = self.create_or_join.prepare_invoke();
        invocation
            .key(keys::room_meta(room))
            .key(keys::room_blocked(room))
            .key(keys::room_free(room))
            .key(keys::room_occupied(room))
            .key(keys::room_occupants(room))
            .key(keys::room_occupant(room, user))
            .key(keys::conn_owner(socket))
            .arg(user.as_str())
            .arg(socket.to_string())
            .arg(process.to_string())
            .arg(spec.name.as_str())
            .arg(spec.width)
            .arg(spec.height);
        for cell in grid::blocked_cells(spec.width, spec.height, &spec.object_indices) {
            invocation.arg(cell.to_string());
        }

        let mut conn = self.conn.clone();
        let reply: Vec<i64> = self
            .bounded("create or join", invocation.invoke_async(&mut conn))
            .await?;
        decode_add_reply(room, user, &reply)
    }

    async fn add_occupant(
        &self,
        room: &RoomId,
        user: &UserId,
        socket: SocketId,
        process: ProcessId,
    ) -> Result<Cell, StoreError> {
        let mut invocation = self.add_occupant.prepare_invoke();
        invocation
            .key(keys::room_meta(room))
            .key(keys::room_free(room))
            .key(keys::room_occupied(room))
            .key(keys::room_occupants(room))
            .key(keys::room_occupant(room, user))
            .key(keys::conn_owner(socket))
            .arg(user.as_str())
            .arg(socket.to_string())
            .arg(process.to_string());

        let mut conn = self.conn.clone();
        let reply: Vec<i64> = self
            .bounded("add occupant", invocation.invoke_async(&mut conn))
            .await?;
        decode_add_reply(room, user, &reply)
    }

    async fn remove_occupant(
        &self,
        room: &RoomId,
        user: &UserId,
        socket: SocketId,
    ) -> Result<RemoveOutcome, StoreError> {
        let mut invocation = self.remove_occupant.prepare_invoke();
        invocation
            .key(keys::room_meta(room))
            .key(keys::room_blocked(room))
            .key(keys::room_free(room))
            .key(keys::room_occupied(room))
            .key(keys::room_occupants(room))
            .key(keys::room_occupant(room, user))
            .key(keys::conn_owner(socket))
            .arg(user.as_str());

        let mut conn = self.conn.clone();
        let reply: Vec<i64> = self
            .bounded("remove occupant", invocation.invoke_async(&mut conn))
            .await?;
        decode_remove_reply(room, user, &reply)
    }

    async fn move_occupant(
        &self,
        room: &RoomId,
        user: &UserId,
        target: Cell,
    ) -> Result<MoveOutcome, StoreError> {
        let mut invocation = self.move_occupant.prepare_invoke();
        invocation
            .key(keys::room_meta(room))
            .key(keys::room_free(room))
            .key(keys::room_occupied(room))
            .key(keys::room_occupant(room, user))
            .arg(target.x)
            .arg(target.y);

        let mut conn = self.conn.clone();
        let reply: Vec<i64> = self
            .bounded("move occupant", invocation.invoke_async(&mut conn))
            .await?;
        decode_move_reply(room, user, &reply)
    }

    async fn list_occupants(
        &self,
        room: &RoomId,
    ) -> Result<HashMap<UserId, OccupantRecord>, StoreError> {
        let mut invocation = self.list_occupants.prepare_invoke();
        invocation
            .key(keys::room_meta(room))
            .key(keys::room_occupants(room))
            .arg(room.as_str());

        let mut conn = self.conn.clone();
        let reply: Option<Vec<String>> = self
            .bounded("list occupants", invocation.invoke_async(&mut conn))
            .await?;
        match reply {
            None => Err(StoreError::RoomNotFound(room.clone())),
            Some(rows) => decode_occupant_rows(&rows),
        }
    }

    async fn owner_process(&self, socket: SocketId) -> Result<Option<ProcessId>, StoreError> {
        let mut conn = self.conn.clone();
        let owner: Option<String> = self
            .bounded("resolve socket owner", conn.get(keys::conn_owner(socket)))
            .await?;
        owner
            .map(|raw| {
                ProcessId::from_str(&raw)
                    .map_err(|e| StoreError::Decode(format!("bad process id '{raw}': {e}")))
            })
            .transpose()
    }
}

/// Decodes the `{status, x, y}` reply shared by the add-shaped scripts.
fn decode_add_reply(room: &RoomId, user: &UserId, reply: &[i64]) -> Result<Cell, StoreError> {
    match reply {
        [1, x, y] => cell_from_parts(*x, *y),
        [-1] => Err(StoreError::RoomNotFound(room.clone())),
        [-2] => Err(StoreError::AlreadyPresent {
            room: room.clone(),
            user: user.clone(),
        }),
        [-3] => Err(StoreError::RoomFull(room.clone())),
        other => Err(StoreError::Decode(format!("unexpected add reply {other:?}"))),
    }
}

fn decode_remove_reply(
    room: &RoomId,
    user: &UserId,
    reply: &[i64],
) -> Result<RemoveOutcome, StoreError> {
    match reply {
        [1, 0] => Ok(RemoveOutcome::Departed),
        [1, 1] => Ok(RemoveOutcome::RoomDeleted),
        [-1] => Err(StoreError::RoomNotFound(room.clone())),
        [-2] => Err(StoreError::OccupantNotFound {
            room: room.clone(),
            user: user.clone(),
        }),
        other => Err(StoreError::Decode(format!(
            "unexpected remove reply {other:?}"
        ))),
    }
}

fn decode_move_reply(
    room: &RoomId,
    user: &UserId,
    reply: &[i64],
) -> Result<MoveOutcome, StoreError> {
    match reply {
        [1, x, y] => Ok(MoveOutcome::Moved(cell_from_parts(*x, *y)?)),
        [0, x, y] => Ok(MoveOutcome::Rejected(cell_from_parts(*x, *y)?)),
        [-1] => Err(StoreError::RoomNotFound(room.clone())),
        [-2] => Err(StoreError::OccupantNotFound {
            room: room.clone(),
            user: user.clone(),
        }),
        other => Err(StoreError::Decode(format!(
            "unexpected move reply {other:?}"
        ))),
    }
}

fn cell_from_parts(x: i64, y: i64) -> Result<Cell, StoreError> {
    let x = u32::try_from(x).map_err(|_| StoreError::Decode(format!("bad cell x {x}")))?;
    let y = u32::try_from(y).map_err(|_| StoreError::Decode(format!("bad cell y {y}")))?;
    Ok(Cell::new(x, y))
}

/// Decodes the flat `userId, x, y, socketId` rows of the list script.
fn decode_occupant_rows(rows: &[String]) -> Result<HashMap<UserId, OccupantRecord>, StoreError> {
    if rows.len() % 4 != 0 {
        return Err(StoreError::Decode(format!(
            "occupant rows not a multiple of 4 (got {})",
            rows.len()
        )));
    }
    let mut occupants = HashMap::with_capacity(rows.len() / 4);
    for row in rows.chunks_exact(4) {
        let x: u32 = row[1]
            .parse()
            .map_err(|_| StoreError::Decode(format!("bad occupant x '{}'", row[1])))?;
        let y: u32 = row[2]
            .parse()
            .map_err(|_| StoreError::Decode(format!("bad occupant y '{}'", row[2])))?;
        let socket = SocketId::from_str(&row[3])
            .map_err(|e| StoreError::Decode(format!("bad socket id '{}': {e}", row[3])))?;
        occupants.insert(
            UserId::from(row[0].clone()),
            OccupantRecord::new(Cell::new(x, y), socket),
        );
    }
    Ok(occupants)
}
