//! WebSocket message dispatch
//!
//! Client messages only bind a connection to a seat or pull a fresh view.
//! Mutations go through the HTTP API.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use std::sync::Arc;

use super::ClientConnection;

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    connection: &ClientConnection,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::JoinRoom {
            room_code,
            participant_id,
        } => {
            tracing::info!(
                "Connection {} joining room {} as {}",
                connection.id,
                room_code,
                participant_id
            );
            // Associated and the snapshot arrive through the event channel
            match state
                .associate_connection(
                    &connection.id,
                    connection.sender.clone(),
                    &room_code,
                    &participant_id,
                )
                .await
            {
                Ok(()) => None,
                Err(e) => {
                    tracing::warn!("Association for {} failed: {}", connection.id, e);
                    Some(ServerMessage::error(&e))
                }
            }
        }

        ClientMessage::SyncRequest => {
            let Some((room_code, participant_id)) =
                state.connections.association(&connection.id).await
            else {
                return Some(ServerMessage::Error {
                    code: "NOT_ASSOCIATED".to_string(),
                    msg: "Join a room before requesting a sync".to_string(),
                });
            };

            match state
                .room_snapshot(&room_code, Some(participant_id.as_str()))
                .await
            {
                Ok(room) => Some(ServerMessage::Snapshot { room }),
                Err(e) => Some(ServerMessage::error(&e)),
            }
        }
    }
}
