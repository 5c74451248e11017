//! Connection liveness and the reconnection grace period.
//!
//! A participant whose last connection drops keeps their seat and ballot for
//! the grace period. Every disconnect and reconnect bumps the participant's
//! presence epoch; the deferred removal re-reads the room when it fires and
//! only acts if the participant is still away at the epoch it was scheduled
//! for. Reconnecting also aborts the pending task outright.

use super::{normalize_room_code, AppState, PendingRemoval};
use crate::broadcast::EventSender;
use crate::error::{RoomError, RoomResult};
use crate::protocol::ServerMessage;
use crate::types::*;
use std::sync::Arc;

impl AppState {
    /// Bind a connection to a participant of a room. Binding an existing
    /// participant id is a reconnection: the seat is marked connected again
    /// and the others are told.
    pub async fn associate_connection(
        self: &Arc<Self>,
        connection_id: &str,
        sender: EventSender,
        room_code: &str,
        participant_id: &str,
    ) -> RoomResult<()> {
        let code = normalize_room_code(room_code);

        if let Some((prev_code, prev_participant)) =
            self.connections.association(connection_id).await
        {
            if prev_code == code && prev_participant == participant_id {
                let room = self.get_room(&code).await.ok_or(RoomError::RoomNotFound)?;
                let room = room.lock().await;
                let participant = room
                    .participant(participant_id)
                    .cloned()
                    .ok_or(RoomError::UserNotFound)?;
                let _ = sender.send(ServerMessage::Associated {
                    participant,
                    room: room.view_for(Some(participant_id)),
                });
                return Ok(());
            }
            self.disconnect_connection(connection_id).await;
        }

        let room = self.get_room(&code).await.ok_or(RoomError::RoomNotFound)?;
        let mut room = room.lock().await;

        let participant = {
            let participant = room
                .participant_mut(participant_id)
                .ok_or(RoomError::UserNotFound)?;
            let was_connected = participant.connected;
            participant.connected = true;
            participant.presence_epoch += 1;
            if !was_connected {
                tracing::info!("{} reconnected to room {}", participant.name, code);
            }
            participant.clone()
        };
        room.touch();

        self.connections
            .register(connection_id, &code, participant_id, sender.clone())
            .await;
        self.cancel_pending_removal(&code, participant_id).await;

        let _ = sender.send(ServerMessage::Associated {
            participant: participant.clone(),
            room: room.view_for(Some(participant_id)),
        });

        self.connections
            .dispatch(&room, Some(connection_id), |_, view| {
                ServerMessage::ParticipantJoined {
                    participant: participant.clone(),
                    room: view,
                }
            })
            .await;

        Ok(())
    }

    /// Handle a closed transport. If it was the participant's last live
    /// connection they are marked disconnected and a removal is scheduled.
    pub async fn disconnect_connection(self: &Arc<Self>, connection_id: &str) {
        let Some((code, participant_id)) = self.connections.association(connection_id).await
        else {
            return;
        };

        let Some(room) = self.get_room(&code).await else {
            self.connections.unregister(connection_id).await;
            return;
        };
        let mut room = room.lock().await;

        // Unregister under the room lock so a concurrent association of the
        // same participant is ordered against this check.
        self.connections.unregister(connection_id).await;
        if self
            .connections
            .has_participant_connection(&code, &participant_id)
            .await
        {
            tracing::debug!(
                "Connection {} closed, participant {} still has other connections",
                connection_id,
                participant_id
            );
            return;
        }

        let (participant, epoch) = {
            let Some(participant) = room.participant_mut(&participant_id) else {
                return;
            };
            participant.connected = false;
            participant.presence_epoch += 1;
            (participant.clone(), participant.presence_epoch)
        };
        room.touch();

        tracing::info!(
            "{} disconnected from room {}, removing in {:?} unless they return",
            participant.name,
            code,
            self.config.grace_period
        );

        self.connections
            .dispatch(&room, None, |_, view| ServerMessage::ParticipantDisconnected {
                participant: participant.clone(),
                room: view,
            })
            .await;

        self.schedule_removal(code, participant_id, epoch).await;
    }

    async fn schedule_removal(
        self: &Arc<Self>,
        code: RoomCode,
        participant_id: ParticipantId,
        epoch: u64,
    ) {
        let state = Arc::clone(self);
        let grace = self.config.grace_period;
        let task_code = code.clone();
        let task_participant = participant_id.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            state
                .expire_participant(&task_code, &task_participant, epoch)
                .await;
        });

        let previous = self.pending_removals.lock().await.insert(
            (code, participant_id),
            PendingRemoval {
                epoch,
                handle: task.abort_handle(),
            },
        );
        if let Some(previous) = previous {
            previous.handle.abort();
        }
    }

    async fn cancel_pending_removal(&self, code: &str, participant_id: &str) {
        let key = (code.to_string(), participant_id.to_string());
        if let Some(pending) = self.pending_removals.lock().await.remove(&key) {
            pending.handle.abort();
            tracing::debug!(
                "Cancelled pending removal of {} in room {} (epoch {})",
                participant_id,
                code,
                pending.epoch
            );
        }
    }

    /// Grace period elapsed: remove the participant if they are still away
    /// at `epoch`. Returns whether a removal happened.
    pub(crate) async fn expire_participant(
        &self,
        code: &str,
        participant_id: &str,
        epoch: u64,
    ) -> bool {
        let key = (code.to_string(), participant_id.to_string());

        let Some(room) = self.get_room(code).await else {
            tracing::debug!("Room {} is gone, nothing to expire", code);
            self.clear_pending_removal(&key, epoch).await;
            return false;
        };
        let mut room = room.lock().await;
        self.clear_pending_removal(&key, epoch).await;

        let still_away = room
            .participant(participant_id)
            .is_some_and(|p| !p.connected && p.presence_epoch == epoch);
        if !still_away {
            tracing::debug!(
                "Skipping removal of {} in room {}: returned or already gone",
                participant_id,
                code
            );
            return false;
        }

        let Some(participant) = room.remove_participant(participant_id) else {
            return false;
        };
        tracing::info!(
            "{} left room {} ({} remaining)",
            participant.name,
            code,
            room.participants.len()
        );

        self.connections
            .dispatch(&room, None, |_, view| ServerMessage::ParticipantLeft {
                participant: participant.clone(),
                room: view,
            })
            .await;

        true
    }

    async fn clear_pending_removal(&self, key: &(RoomCode, ParticipantId), epoch: u64) {
        let mut pending = self.pending_removals.lock().await;
        if pending.get(key).is_some_and(|p| p.epoch == epoch) {
            pending.remove(key);
        }
    }
}
