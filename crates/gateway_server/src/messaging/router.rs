//! Message routing logic for dispatching client verbs.
//!
//! This module handles the parsing of incoming client frames and dispatches
//! each verb to its handler. Frames that fail to parse are answered with an
//! error message instead of tearing the connection down.

use crate::{
    connection::ConnectionId,
    error::GatewayError,
    messaging::{ClientVerb, ServerMessage},
    server::core::GatewayContext,
    server::handlers,
};
use tracing::{debug, trace};

/// Routes a raw client frame to the appropriate verb handler.
///
/// # Arguments
///
/// * `text` - The raw frame text from the client (expected to be JSON)
/// * `connection_id` - The unique identifier for the client connection
/// * `context` - The gateway's shared state
///
/// # Returns
///
/// `Ok(())` if the frame was handled (including handled failures that were
/// answered with an error message), or a `GatewayError` for faults that
/// should end the connection.
pub async fn route_client_message(
    text: &str,
    connection_id: ConnectionId,
    context: &GatewayContext,
) -> Result<(), GatewayError> {
    let verb: ClientVerb = match serde_json::from_str(text) {
        Ok(verb) => verb,
        Err(e) => {
            debug!("Unparseable frame from connection {}: {}", connection_id, e);
            context
                .connections
                .send_message(
                    connection_id,
                    &ServerMessage::Error {
                        source: "unknown".to_string(),
                        message: format!("invalid message: {e}"),
                    },
                )
                .await;
            return Ok(());
        }
    };

    trace!(
        "📨 Routing '{}' from connection {}",
        verb.event_name(),
        connection_id
    );

    match verb {
        ClientVerb::RoomCreate {
            token,
            name,
            width,
            height,
            space_id,
            objects_array,
        } => {
            handlers::handle_room_create(
                context,
                connection_id,
                token,
                name,
                width,
                height,
                space_id,
                objects_array,
            )
            .await
        }
        ClientVerb::RoomJoin { token, space_id } => {
            handlers::handle_room_join(context, connection_id, token, space_id).await
        }
        ClientVerb::PlayerMove { position } => {
            handlers::handle_player_move(context, connection_id, position).await
        }
        ClientVerb::RoomLeave { token, space_id } => {
            handlers::handle_room_leave(context, connection_id, token, space_id).await
        }
        ClientVerb::WebrtcSignal { to, data } => {
            handlers::handle_webrtc_signal(context, connection_id, to, data).await
        }
    }
}
