//! Lua scripts for the Redis backend.
//!
//! One script per store operation. Redis runs a script as a single atomic
//! unit, which is what makes each operation an indivisible transaction: no
//! other command and no other script interleaves with it. The scripts never
//! touch keys outside the room they were invoked for plus the one registry
//! entry, so the cost of atomicity stays bounded by room size.
//!
//! Status-code convention, always the first element of the returned array:
//!
//! - `-1` room not found
//! - `-2` occupant conflict (`AlreadyPresent` on add, `OccupantNotFound`
//!   on remove/move)
//! - `-3` room full
//! - `0`  move rejected (followed by the current cell)
//! - `1`  success (followed by the resulting cell where applicable)
//!
//! `LIST` is the exception: it returns a flat array of occupant fields, or a
//! nil reply when the room does not exist.
//!
//! Key layouts are documented per script and must match
//! [`super::keys`].

/// Create the room if absent, then add the occupant.
///
/// KEYS: 1=meta, 2=blocked, 3=free, 4=occupied, 5=occupants, 6=record,
/// 7=conn.
/// ARGV: 1=userId, 2=socketId, 3=processId, 4=name, 5=width, 6=height,
/// 7..=blocked cells ("x,y", pre-filtered to grid bounds).
///
/// When the metadata hash already exists the geometry arguments are ignored
/// and only the add half runs. A creation whose add half fails (every cell
/// blocked) deletes the keys it just wrote, so no empty room outlives the
/// script.
pub const CREATE_OR_JOIN: &str = r#"
local created = false
if redis.call("EXISTS", KEYS[1]) == 0 then
    created = true
    redis.call("HSET", KEYS[1],
        "name", ARGV[4],
        "width", ARGV[5],
        "height", ARGV[6],
        "creatorId", ARGV[1])
    for i = 7, #ARGV do
        redis.call("SADD", KEYS[2], ARGV[i])
    end
    local width = tonumber(ARGV[5])
    local height = tonumber(ARGV[6])
    for y = 1, height do
        for x = 1, width do
            local cell = x .. "," .. y
            if redis.call("SISMEMBER", KEYS[2], cell) == 0 then
                redis.call("SADD", KEYS[3], cell)
            end
        end
    end
end
if redis.call("SISMEMBER", KEYS[5], ARGV[1]) == 1 then
    return {-2}
end
local cell = redis.call("SPOP", KEYS[3])
if not cell then
    if created then
        redis.call("DEL", KEYS[1], KEYS[2], KEYS[3])
    end
    return {-3}
end
redis.call("SADD", KEYS[4], cell)
local x, y = string.match(cell, "^(%d+),(%d+)$")
redis.call("HSET", KEYS[6], "x", x, "y", y, "socketId", ARGV[2])
redis.call("SADD", KEYS[5], ARGV[1])
redis.call("SET", KEYS[7], ARGV[3])
return {1, tonumber(x), tonumber(y)}
"#;

/// Add an occupant to an existing room.
///
/// KEYS: 1=meta, 2=free, 3=occupied, 4=occupants, 5=record, 6=conn.
/// ARGV: 1=userId, 2=socketId, 3=processId.
pub const ADD_OCCUPANT: &str = r#"
if redis.call("EXISTS", KEYS[1]) == 0 then
    return {-1}
end
if redis.call("SISMEMBER", KEYS[4], ARGV[1]) == 1 then
    return {-2}
end
local cell = redis.call("SPOP", KEYS[2])
if not cell then
    return {-3}
end
redis.call("SADD", KEYS[3], cell)
local x, y = string.match(cell, "^(%d+),(%d+)$")
redis.call("HSET", KEYS[5], "x", x, "y", y, "socketId", ARGV[2])
redis.call("SADD", KEYS[4], ARGV[1])
redis.call("SET", KEYS[6], ARGV[3])
return {1, tonumber(x), tonumber(y)}
"#;

/// Remove an occupant, deleting the room when it empties.
///
/// KEYS: 1=meta, 2=blocked, 3=free, 4=occupied, 5=occupants, 6=record,
/// 7=conn.
/// ARGV: 1=userId.
///
/// Returns `{1, 1}` when the departure emptied the room and its keys were
/// deleted, `{1, 0}` otherwise.
pub const REMOVE_OCCUPANT: &str = r#"
if redis.call("EXISTS", KEYS[1]) == 0 then
    return {-1}
end
if redis.call("SISMEMBER", KEYS[5], ARGV[1]) == 0 then
    return {-2}
end
local x = redis.call("HGET", KEYS[6], "x")
local y = redis.call("HGET", KEYS[6], "y")
local cell = x .. "," .. y
redis.call("SREM", KEYS[4], cell)
redis.call("SADD", KEYS[3], cell)
redis.call("SREM", KEYS[5], ARGV[1])
redis.call("DEL", KEYS[6])
redis.call("DEL", KEYS[7])
if redis.call("SCARD", KEYS[5]) == 0 then
    redis.call("DEL", KEYS[1], KEYS[2], KEYS[3], KEYS[4], KEYS[5])
    return {1, 1}
end
return {1, 0}
"#;

/// Attempt a one-step move.
///
/// KEYS: 1=meta, 2=free, 3=occupied, 4=record.
/// ARGV: 1=newX, 2=newY.
///
/// Rejection (`{0, x, y}`) carries the occupant's unchanged current cell so
/// the caller can correct a predicted position.
pub const MOVE_OCCUPANT: &str = r#"
if redis.call("EXISTS", KEYS[1]) == 0 then
    return {-1}
end
local x = redis.call("HGET", KEYS[4], "x")
local y = redis.call("HGET", KEYS[4], "y")
if not x then
    return {-2}
end
local fromX = tonumber(x)
local fromY = tonumber(y)
local toX = tonumber(ARGV[1])
local toY = tonumber(ARGV[2])
local target = toX .. "," .. toY
local step = math.abs(toX - fromX) + math.abs(toY - fromY)
if step ~= 1 or redis.call("SISMEMBER", KEYS[2], target) == 0 then
    return {0, fromX, fromY}
end
redis.call("SREM", KEYS[2], target)
redis.call("SADD", KEYS[3], target)
redis.call("SREM", KEYS[3], fromX .. "," .. fromY)
redis.call("SADD", KEYS[2], fromX .. "," .. fromY)
redis.call("HSET", KEYS[4], "x", ARGV[1], "y", ARGV[2])
return {1, toX, toY}
"#;

/// Snapshot every occupant of a room.
///
/// KEYS: 1=meta, 2=occupants.
/// ARGV: 1=roomId.
///
/// Returns a nil reply when the room does not exist, otherwise a flat array
/// of `userId, x, y, socketId` per occupant. Record keys are rebuilt inside
/// the script from ARGV[1]; the layout must stay in sync with the
/// key-schema module.
pub const LIST_OCCUPANTS: &str = r#"
if redis.call("EXISTS", KEYS[1]) == 0 then
    return false
end
local result = {}
local users = redis.call("SMEMBERS", KEYS[2])
for _, uid in ipairs(users) do
    local rec = redis.call("HMGET", "room:" .. ARGV[1] .. ":occupant:" .. uid,
        "x", "y", "socketId")
    result[#result + 1] = uid
    result[#result + 1] = rec[1]
    result[#result + 1] = rec[2]
    result[#result + 1] = rec[3]
end
return result
"#;
