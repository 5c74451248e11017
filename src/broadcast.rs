//! Fan-out of room events to live connections.
//!
//! Each WebSocket task owns the receiving half of an unbounded channel; the
//! registry keeps the sending half together with the room and participant the
//! connection announced. Dispatch runs while the caller holds the room lock,
//! so every connection sees a room's events in the order they were applied.

use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

pub type EventSender = mpsc::UnboundedSender<ServerMessage>;

#[derive(Debug)]
struct Connection {
    room_code: RoomCode,
    participant_id: ParticipantId,
    sender: EventSender,
}

#[derive(Debug, Default)]
struct Registry {
    connections: HashMap<ConnectionId, Connection>,
    by_room: HashMap<RoomCode, HashSet<ConnectionId>>,
}

impl Registry {
    fn detach(&mut self, connection_id: &str) -> Option<Connection> {
        let conn = self.connections.remove(connection_id)?;
        if let Some(ids) = self.by_room.get_mut(&conn.room_code) {
            ids.remove(connection_id);
            if ids.is_empty() {
                self.by_room.remove(&conn.room_code);
            }
        }
        Some(conn)
    }
}

/// Connections associated with rooms. A connection belongs to at most one
/// room at a time.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    inner: RwLock<Registry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a connection, replacing any previous association.
    /// Returns the previous (room, participant) if there was one.
    pub async fn register(
        &self,
        connection_id: &str,
        room_code: &str,
        participant_id: &str,
        sender: EventSender,
    ) -> Option<(RoomCode, ParticipantId)> {
        let mut registry = self.inner.write().await;
        let previous = registry
            .detach(connection_id)
            .map(|c| (c.room_code, c.participant_id));

        registry
            .by_room
            .entry(room_code.to_string())
            .or_default()
            .insert(connection_id.to_string());
        registry.connections.insert(
            connection_id.to_string(),
            Connection {
                room_code: room_code.to_string(),
                participant_id: participant_id.to_string(),
                sender,
            },
        );
        previous
    }

    pub async fn unregister(&self, connection_id: &str) -> Option<(RoomCode, ParticipantId)> {
        self.inner
            .write()
            .await
            .detach(connection_id)
            .map(|c| (c.room_code, c.participant_id))
    }

    pub async fn association(&self, connection_id: &str) -> Option<(RoomCode, ParticipantId)> {
        self.inner
            .read()
            .await
            .connections
            .get(connection_id)
            .map(|c| (c.room_code.clone(), c.participant_id.clone()))
    }

    /// Whether any live connection still represents this participant
    pub async fn has_participant_connection(&self, room_code: &str, participant_id: &str) -> bool {
        let registry = self.inner.read().await;
        registry.by_room.get(room_code).is_some_and(|ids| {
            ids.iter().any(|id| {
                registry
                    .connections
                    .get(id)
                    .is_some_and(|c| c.participant_id == participant_id)
            })
        })
    }

    pub async fn room_connection_count(&self, room_code: &str) -> usize {
        self.inner
            .read()
            .await
            .by_room
            .get(room_code)
            .map_or(0, |ids| ids.len())
    }

    /// Forget every connection of a room that no longer exists
    pub async fn drop_room(&self, room_code: &str) {
        let mut registry = self.inner.write().await;
        if let Some(ids) = registry.by_room.remove(room_code) {
            for id in ids {
                registry.connections.remove(&id);
            }
        }
    }

    /// Deliver an event to every connection of `room`, personalized per
    /// receiver. `build` gets the receiver's participant id and the room view
    /// masked for that participant. Returns the number of connections the
    /// event was handed to.
    pub async fn dispatch<F>(&self, room: &Room, exclude: Option<&str>, mut build: F) -> usize
    where
        F: FnMut(&str, RoomView) -> ServerMessage,
    {
        let registry = self.inner.read().await;
        let Some(ids) = registry.by_room.get(&room.code) else {
            return 0;
        };

        let mut delivered = 0;
        for id in ids {
            if exclude == Some(id.as_str()) {
                continue;
            }
            let Some(conn) = registry.connections.get(id) else {
                continue;
            };

            let view = room.view_for(Some(conn.participant_id.as_str()));
            let msg = build(conn.participant_id.as_str(), view);

            // A closed channel means the socket task is shutting down; its
            // disconnect handling removes the registration.
            if conn.sender.send(msg).is_err() {
                tracing::debug!("Dropping event for closed connection {}", id);
            } else {
                delivered += 1;
            }
        }

        tracing::debug!(
            "Dispatched event to {}/{} connections in room {}",
            delivered,
            ids.len(),
            room.code
        );
        delivered
    }
}

/// Spawn a background task that drops empty rooms once they have been idle
/// for longer than the configured TTL
pub fn spawn_room_reaper(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.reap_interval);
        // First tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            let removed = state.reap_idle_rooms(chrono::Utc::now()).await;
            if removed > 0 {
                tracing::info!("Reaped {} idle rooms", removed);
            }
        }
    });
}
