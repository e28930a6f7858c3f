//! Connection handling logic for WebSocket clients.
//!
//! This module contains the connection lifecycle (handshake, message
//! pumping, disconnect-as-leave) and the handlers for every client verb,
//! plus the dispatcher for messages arriving off the bus.
//!
//! Verb failures are answered with an `error` frame naming the verb and
//! never tear the connection down; only transport faults end a connection.

use crate::{
    auth::Claims,
    connection::{client::Session, ConnectionId},
    error::GatewayError,
    messaging::{route_client_message, AckStatus, PlayerState, ServerMessage},
    server::core::GatewayContext,
};
use futures::{SinkExt, StreamExt};
use huddle_room_system::{
    BusMessage, Cell, MoveOutcome, OccupantRecord, ProcEvent, RemoveOutcome, RoomEvent, RoomId,
    RoomSpec, SocketId, StoreError, UserId,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, trace, warn};

/// Handles a single client connection from establishment to cleanup.
///
/// # Connection Flow
///
/// 1. Perform WebSocket handshake
/// 2. Register the connection and mint its socket ID
/// 3. Pump incoming frames through the verb router and outgoing frames
///    from the connection manager's channel onto the socket
/// 4. On termination, run the departure path for any session still held
///    and unregister the connection
///
/// A shutdown signal closes the socket with a normal close frame, which
/// funnels into the same cleanup as a client-initiated disconnect.
///
/// # Returns
///
/// `Ok(())` if the connection was handled to completion, or a
/// `GatewayError` if the handshake failed.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    context: Arc<GatewayContext>,
    mut shutdown_receiver: broadcast::Receiver<()>,
) -> Result<(), GatewayError> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| GatewayError::Network(format!("WebSocket handshake failed: {e}")))?;

    let (ws_sender, mut ws_receiver) = ws_stream.split();
    let ws_sender = Arc::new(tokio::sync::Mutex::new(ws_sender));
    let (connection_id, socket_id) = context.connections.add_connection(addr).await;

    let mut message_receiver = context.connections.subscribe();
    let ws_sender_incoming = ws_sender.clone();
    let ws_sender_outgoing = ws_sender.clone();

    // Incoming frame task: parses client verbs and dispatches them.
    let incoming_task = {
        let context = context.clone();
        async move {
            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if let Err(e) = route_client_message(&text, connection_id, &context).await {
                            trace!("❌ Verb handling error: {}", e);
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("🔌 Client {} requested close", connection_id);
                        break;
                    }
                    Ok(Message::Ping(data)) => {
                        let mut ws_sender = ws_sender_incoming.lock().await;
                        let _ = ws_sender.send(Message::Pong(data)).await;
                    }
                    Err(e) => {
                        error!("WebSocket error for connection {}: {}", connection_id, e);
                        break;
                    }
                    _ => {}
                }
            }
        }
    };

    // Outgoing frame task: filters the shared channel by this connection.
    let outgoing_task = {
        let ws_sender = ws_sender_outgoing;
        async move {
            while let Ok((target_connection_id, message)) = message_receiver.recv().await {
                if target_connection_id == connection_id {
                    let message_text = String::from_utf8_lossy(&message);
                    let mut ws_sender = ws_sender.lock().await;
                    if let Err(e) = ws_sender
                        .send(Message::Text(message_text.to_string().into()))
                        .await
                    {
                        error!("Failed to send message: {}", e);
                        break;
                    }
                }
            }
        }
    };

    tokio::select! {
        _ = incoming_task => {},
        _ = outgoing_task => {},
        _ = shutdown_receiver.recv() => {
            let mut ws_sender = ws_sender.lock().await;
            let _ = ws_sender.send(Message::Close(None)).await;
        }
    }

    // Disconnecting is leaving: whatever session the connection still
    // holds goes through the same departure path as an explicit leave,
    // before the connection itself is forgotten.
    if let Some(session) = context.connections.clear_session(connection_id).await {
        leave_room(&context, connection_id, socket_id, session, false).await;
    }
    context.connections.remove_connection(connection_id).await;
    Ok(())
}

// ============================================================================
// Verb Handlers
// ============================================================================

/// Which acknowledgement a successful room entry gets.
enum JoinKind {
    Created,
    Joined,
}

/// Upper bound on width×height for a created room. Geometry comes off the
/// wire unauthenticated beyond the token, and store initialization walks
/// every cell, so oversized grids are refused before any backend work.
const MAX_ROOM_CELLS: u64 = 10_000;

/// Handles `room:create`: create the space if absent, then enter it.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn handle_room_create(
    context: &GatewayContext,
    connection_id: ConnectionId,
    token: String,
    name: String,
    width: u32,
    height: u32,
    space_id: String,
    objects_array: Vec<u32>,
) -> Result<(), GatewayError> {
    let Some(claims) =
        verified_claims(context, connection_id, "room:create", &token, &space_id).await
    else {
        return Ok(());
    };
    if width == 0 || height == 0 || u64::from(width) * u64::from(height) > MAX_ROOM_CELLS {
        send_error(
            context,
            connection_id,
            "room:create",
            "room dimensions out of range",
        )
        .await;
        return Ok(());
    }
    let Some(socket_id) = entry_socket(context, connection_id, "room:create").await else {
        return Ok(());
    };
    let user_id = UserId::from(claims.user_id);
    let room_id = RoomId::from(space_id);
    let spec = RoomSpec {
        room_id: room_id.clone(),
        name,
        width,
        height,
        object_indices: objects_array,
    };
    match context
        .store
        .create_or_join(&spec, &user_id, socket_id, context.process_id)
        .await
    {
        Ok(spawn) => {
            finish_join(
                context,
                connection_id,
                socket_id,
                user_id,
                room_id,
                spawn,
                JoinKind::Created,
            )
            .await
        }
        Err(e) => {
            report_store_failure(context, connection_id, "room:create", e).await;
            Ok(())
        }
    }
}

/// Handles `room:join`: enter an existing space.
pub(crate) async fn handle_room_join(
    context: &GatewayContext,
    connection_id: ConnectionId,
    token: String,
    space_id: String,
) -> Result<(), GatewayError> {
    let Some(claims) =
        verified_claims(context, connection_id, "room:join", &token, &space_id).await
    else {
        return Ok(());
    };
    let Some(socket_id) = entry_socket(context, connection_id, "room:join").await else {
        return Ok(());
    };
    let user_id = UserId::from(claims.user_id);
    let room_id = RoomId::from(space_id);
    match context
        .store
        .add_occupant(&room_id, &user_id, socket_id, context.process_id)
        .await
    {
        Ok(spawn) => {
            finish_join(
                context,
                connection_id,
                socket_id,
                user_id,
                room_id,
                spawn,
                JoinKind::Joined,
            )
            .await
        }
        Err(e) => {
            report_store_failure(context, connection_id, "room:join", e).await;
            Ok(())
        }
    }
}

/// Handles `player:move`: attempt one step, acknowledging with the
/// authoritative position either way.
pub(crate) async fn handle_player_move(
    context: &GatewayContext,
    connection_id: ConnectionId,
    position: Cell,
) -> Result<(), GatewayError> {
    let Some(session) = context.connections.session(connection_id).await else {
        send_error(context, connection_id, "player:move", "no active room session").await;
        return Ok(());
    };
    match context
        .store
        .move_occupant(&session.room_id, &session.user_id, position)
        .await
    {
        Ok(MoveOutcome::Moved(cell)) => {
            context
                .connections
                .send_message(
                    connection_id,
                    &ServerMessage::MoveAck {
                        status: AckStatus::Success,
                        position: cell,
                    },
                )
                .await;
            let event = RoomEvent::Moved {
                user_id: session.user_id,
                position: cell,
            };
            context.rooms.apply_local(&session.room_id, event.clone()).await;
            publish_room_event(context, &session.room_id, event);
        }
        Ok(MoveOutcome::Rejected(current)) => {
            // Snap the client back; nothing changed, nothing to publish.
            context
                .connections
                .send_message(
                    connection_id,
                    &ServerMessage::MoveAck {
                        status: AckStatus::Rejected,
                        position: current,
                    },
                )
                .await;
        }
        Err(e) => report_store_failure(context, connection_id, "player:move", e).await,
    }
    Ok(())
}

/// Handles `room:leave`: leave the space the session belongs to.
pub(crate) async fn handle_room_leave(
    context: &GatewayContext,
    connection_id: ConnectionId,
    token: String,
    space_id: String,
) -> Result<(), GatewayError> {
    if verified_claims(context, connection_id, "room:leave", &token, &space_id)
        .await
        .is_none()
    {
        return Ok(());
    }
    let Some(session) = context.connections.session(connection_id).await else {
        send_error(context, connection_id, "room:leave", "no active room session").await;
        return Ok(());
    };
    if session.room_id.as_str() != space_id {
        send_error(
            context,
            connection_id,
            "room:leave",
            "session belongs to another space",
        )
        .await;
        return Ok(());
    }
    let Some(socket_id) = context.connections.socket_id(connection_id).await else {
        return Ok(());
    };
    if let Some(session) = context.connections.clear_session(connection_id).await {
        let departed =
            leave_room(context, connection_id, socket_id, session.clone(), true).await;
        // A store outage left the occupant record in place; restore the
        // session so a retried leave (or the disconnect path) still finds
        // a membership to clean up.
        if !departed {
            context
                .connections
                .begin_session(connection_id, session.user_id, session.room_id)
                .await;
        }
    }
    Ok(())
}

/// Handles `webrtc-signal`: relay an opaque payload to the target socket,
/// directly when it is local and via its owner's process channel otherwise.
///
/// A target the registry no longer knows is dropped without an error; the
/// sender will learn of the departure through `player:left`.
pub(crate) async fn handle_webrtc_signal(
    context: &GatewayContext,
    connection_id: ConnectionId,
    to: SocketId,
    data: serde_json::Value,
) -> Result<(), GatewayError> {
    if context.connections.session(connection_id).await.is_none() {
        send_error(context, connection_id, "webrtc-signal", "no active room session").await;
        return Ok(());
    }
    let Some(from) = context.connections.socket_id(connection_id).await else {
        return Ok(());
    };
    let message = ServerMessage::WebrtcSignal {
        from,
        data: data.clone(),
    };
    if context.connections.send_message_to_socket(to, &message).await {
        return Ok(());
    }
    match context.store.owner_process(to).await {
        Ok(Some(process)) => {
            let bus = context.bus.clone();
            let event = ProcEvent::Signal { to, from, data };
            tokio::spawn(async move {
                if let Err(e) = bus.publish_proc(process, &event).await {
                    warn!(
                        "❌ Failed to relay a signal to socket {}: {}",
                        event.target(),
                        e
                    );
                }
            });
        }
        Ok(None) => debug!("📡 Dropping a signal for unregistered socket {}", to),
        Err(e) => warn!("❌ Registry lookup failed for socket {}: {}", to, e),
    }
    Ok(())
}

// ============================================================================
// Bus Dispatch
// ============================================================================

/// Dispatches one message from this process's bus subscription.
///
/// Relayed room events feed the room task (skipped when this process does
/// not serve the room); proc events target a specific local socket and are
/// dropped quietly if it disconnected in the meantime.
pub(crate) async fn handle_bus_message(context: &GatewayContext, message: BusMessage) {
    match message {
        BusMessage::Room { room_id, event } => {
            context.rooms.apply_remote(&room_id, event).await;
        }
        BusMessage::Proc(event) => {
            let target = event.target();
            let message = match event {
                ProcEvent::Signal { from, data, .. } => ServerMessage::WebrtcSignal { from, data },
                ProcEvent::Near {
                    user_id, socket_id, ..
                } => ServerMessage::PlayerNear {
                    player_id: user_id,
                    socket_id,
                },
                ProcEvent::Far {
                    user_id, socket_id, ..
                } => ServerMessage::PlayerFar {
                    player_id: user_id,
                    socket_id,
                },
            };
            if !context.connections.send_message_to_socket(target, &message).await {
                debug!("📡 Dropping a relayed message for departed socket {}", target);
            }
        }
    }
}

// ============================================================================
// Shared Paths
// ============================================================================

/// The departure path shared by `room:leave` and disconnects.
///
/// Removes the occupant from the store, then feeds the departure through
/// the room task and onto the room channel. The session was already
/// cleared by the caller, so this runs at most once per membership.
///
/// Returns whether the membership is settled: removal succeeded, or the
/// store proved the record already gone. An infrastructure failure returns
/// false, leaving the record in place for the caller to retry against.
pub(crate) async fn leave_room(
    context: &GatewayContext,
    connection_id: ConnectionId,
    socket_id: SocketId,
    session: Session,
    with_ack: bool,
) -> bool {
    match context
        .store
        .remove_occupant(&session.room_id, &session.user_id, socket_id)
        .await
    {
        Ok(outcome) => {
            if with_ack {
                context
                    .connections
                    .send_message(
                        connection_id,
                        &ServerMessage::LeaveAck {
                            status: AckStatus::Success,
                            player_id: session.user_id.clone(),
                        },
                    )
                    .await;
            }
            info!("👋 {} left {}", session.user_id, session.room_id);
            let event = RoomEvent::Left {
                user_id: session.user_id,
            };
            context.rooms.apply_local(&session.room_id, event.clone()).await;
            publish_room_event(context, &session.room_id, event);
            if outcome == RemoveOutcome::RoomDeleted {
                info!("🗄️ Room {} deleted with its last occupant", session.room_id);
                context.rooms.remove(&session.room_id);
            }
            true
        }
        Err(e) => {
            warn!(
                "⚠️ Failed to remove {} from {}: {}",
                session.user_id, session.room_id, e
            );
            if with_ack {
                send_error(context, connection_id, "room:leave", e.to_string()).await;
            }
            // A domain refusal means the store holds no record for this
            // membership, so there is nothing left to clean up.
            e.is_domain()
        }
    }
}

/// Completes a successful room entry: roster snapshot, session, ack, and
/// the join event through the room task and onto the room channel.
async fn finish_join(
    context: &GatewayContext,
    connection_id: ConnectionId,
    socket_id: SocketId,
    user_id: UserId,
    room_id: RoomId,
    spawn: Cell,
    kind: JoinKind,
) -> Result<(), GatewayError> {
    let snapshot = match context.store.list_occupants(&room_id).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            // The entry itself has committed; seed from what we know and
            // let relayed events fill the rest in.
            warn!("⚠️ Failed to read the roster of {} after entry: {}", room_id, e);
            let mut fallback = HashMap::new();
            fallback.insert(
                user_id.clone(),
                OccupantRecord {
                    cell: spawn,
                    socket_id,
                },
            );
            fallback
        }
    };
    context
        .connections
        .begin_session(connection_id, user_id.clone(), room_id.clone())
        .await;
    let ack = match kind {
        JoinKind::Created => ServerMessage::RoomCreated {
            status: AckStatus::Success,
            player_id: user_id.clone(),
            room_id: room_id.clone(),
            spawn,
        },
        JoinKind::Joined => ServerMessage::RoomJoined {
            status: AckStatus::Success,
            player_id: user_id.clone(),
            players: roster(&snapshot),
            spawn,
        },
    };
    context.connections.send_message(connection_id, &ack).await;
    info!("🙋 {} entered {} at {}", user_id, room_id, spawn);
    let event = RoomEvent::Joined {
        user_id,
        position: spawn,
        socket_id,
    };
    context.rooms.apply_seeded(&room_id, snapshot, event.clone()).await;
    publish_room_event(context, &room_id, event);
    Ok(())
}

/// Publishes a room event to the room's channel, fire-and-forget.
pub(crate) fn publish_room_event(context: &GatewayContext, room_id: &RoomId, event: RoomEvent) {
    let bus = context.bus.clone();
    let room_id = room_id.clone();
    tokio::spawn(async move {
        if let Err(e) = bus.publish_room(&room_id, &event).await {
            warn!("❌ Failed to publish a room event for {}: {}", room_id, e);
        }
    });
}

// ============================================================================
// Helpers
// ============================================================================

/// Verifies a room verb's token and checks it grants the targeted space.
/// Failures are answered with an error frame; the caller just returns.
async fn verified_claims(
    context: &GatewayContext,
    connection_id: ConnectionId,
    event: &str,
    token: &str,
    space_id: &str,
) -> Option<Claims> {
    let claims = match context.verifier.verify(token) {
        Ok(claims) => claims,
        Err(e) => {
            warn!("🔒 Rejected {} from connection {}: {}", event, connection_id, e);
            send_error(context, connection_id, event, e.to_string()).await;
            return None;
        }
    };
    if claims.room_id != space_id {
        send_error(context, connection_id, event, "token does not grant this space").await;
        return None;
    }
    Some(claims)
}

/// Guards a room entry verb: the connection must be sessionless and still
/// tracked. Returns its socket ID when entry may proceed.
async fn entry_socket(
    context: &GatewayContext,
    connection_id: ConnectionId,
    event: &str,
) -> Option<SocketId> {
    if context.connections.session(connection_id).await.is_some() {
        send_error(
            context,
            connection_id,
            event,
            "connection already holds a room session",
        )
        .await;
        return None;
    }
    context.connections.socket_id(connection_id).await
}

/// Converts a store snapshot into the roster shape handed to clients.
fn roster(snapshot: &HashMap<UserId, OccupantRecord>) -> HashMap<UserId, PlayerState> {
    snapshot
        .iter()
        .map(|(user_id, record)| {
            (
                user_id.clone(),
                PlayerState {
                    position: record.cell,
                    socket_id: record.socket_id,
                },
            )
        })
        .collect()
}

/// Sends an error frame naming the verb that failed.
async fn send_error(
    context: &GatewayContext,
    connection_id: ConnectionId,
    event: &str,
    message: impl Into<String>,
) {
    context
        .connections
        .send_message(
            connection_id,
            &ServerMessage::Error {
                source: event.to_string(),
                message: message.into(),
            },
        )
        .await;
}

/// Reports a failed store operation back to the client, logging domain
/// refusals quietly and infrastructure failures loudly.
async fn report_store_failure(
    context: &GatewayContext,
    connection_id: ConnectionId,
    event: &str,
    error: StoreError,
) {
    if error.is_domain() {
        debug!("Refused {} for connection {}: {}", event, connection_id, error);
    } else {
        warn!(
            "❌ Store failure during {} for connection {}: {}",
            event, connection_id, error
        );
    }
    send_error(context, connection_id, event, error.to_string()).await;
}
