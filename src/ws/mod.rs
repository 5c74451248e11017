pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::broadcast::EventSender;
use crate::protocol::{ClientMessage, ServerMessage, PROTOCOL_VERSION};
use crate::state::AppState;
use crate::types::ConnectionId;

/// A live socket as seen by message handlers
#[derive(Debug, Clone)]
pub struct ClientConnection {
    pub id: ConnectionId,
    pub sender: EventSender,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Parse and dispatch one client frame. Replies are queued on the
/// connection's event channel behind any room events already waiting, so a
/// pulled snapshot never overtakes an older push.
pub async fn handle_text(text: &str, connection: &ClientConnection, state: &Arc<AppState>) {
    let response = match serde_json::from_str::<ClientMessage>(text) {
        Ok(client_msg) => handlers::handle_message(client_msg, connection, state).await,
        Err(e) => {
            tracing::warn!("Failed to parse client message: {}", e);
            Some(ServerMessage::Error {
                code: "PARSE_ERROR".to_string(),
                msg: format!("Invalid message format: {}", e),
            })
        }
    };

    if let Some(response) = response {
        if connection.sender.send(response).is_err() {
            tracing::debug!("Connection {} closed before reply", connection.id);
        }
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut events) = mpsc::unbounded_channel::<ServerMessage>();

    let connection = ClientConnection {
        id: ulid::Ulid::new().to_string(),
        sender: tx,
    };
    tracing::info!("WebSocket connected: {}", connection.id);

    let welcome = ServerMessage::Welcome {
        protocol: PROTOCOL_VERSION.to_string(),
        connection_id: connection.id.clone(),
        server_now: chrono::Utc::now(),
    };
    if let Ok(msg) = serde_json::to_string(&welcome) {
        if sender.send(Message::Text(msg.into())).await.is_err() {
            tracing::error!("Failed to send welcome message");
            return;
        }
    }

    loop {
        tokio::select! {
            // Room events queued for this connection
            event = events.recv() => {
                let Some(msg) = event else { break };
                if let Ok(json) = serde_json::to_string(&msg) {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
            }

            // Handle client messages
            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message: {}", text);
                        handle_text(&text, &connection, &state).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed by client");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    state.disconnect_connection(&connection.id).await;
    tracing::info!("WebSocket connection closed: {}", connection.id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;

    #[tokio::test]
    async fn test_sync_reply_queues_behind_pending_events() {
        let state = Arc::new(AppState::default());
        let code = state.create_room("Team").await.unwrap();
        let (ann, _) = state.join_room(&code, "Ann", false).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = ClientConnection {
            id: "c1".to_string(),
            sender: tx,
        };
        let join = serde_json::json!({
            "t": "join_room",
            "room_code": code,
            "participant_id": ann.id,
        });
        handle_text(&join.to_string(), &connection, &state).await;

        state
            .cast_vote(&code, &ann.id, VoteSignal::Cast(VoteValue::Points(2)))
            .await
            .unwrap();
        handle_text(r#"{"t":"sync_request"}"#, &connection, &state).await;

        assert!(matches!(rx.try_recv(), Ok(ServerMessage::Associated { .. })));
        assert!(matches!(rx.try_recv(), Ok(ServerMessage::VoteCast { .. })));
        match rx.try_recv() {
            Ok(ServerMessage::Snapshot { room }) => {
                assert_eq!(room.votes[&ann.id], VisibleBallot::Value(VoteValue::Points(2)));
            }
            other => panic!("Expected Snapshot, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_frame_queues_parse_error() {
        let state = Arc::new(AppState::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = ClientConnection {
            id: "c1".to_string(),
            sender: tx,
        };

        handle_text("{not json", &connection, &state).await;
        assert!(matches!(
            rx.try_recv(),
            Ok(ServerMessage::Error { ref code, .. }) if code == "PARSE_ERROR"
        ));
    }
}
