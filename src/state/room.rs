use super::avatar::allocate_avatar;
use super::visibility::visible_ballot;
use super::vote::compute_stats;
use super::AppState;
use crate::error::{RoomError, RoomResult};
use crate::protocol::ServerMessage;
use crate::types::*;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LENGTH: usize = 6;

pub const MAX_NAME_CHARS: usize = 20;
const MAX_EMOJI_CHARS: usize = 16;

/// Generate a random room code (6 characters)
pub fn generate_room_code() -> RoomCode {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
        .collect()
}

pub fn normalize_room_code(code: &str) -> RoomCode {
    code.trim().to_uppercase()
}

/// Trim and truncate a display name; empty names are rejected
pub fn sanitize_display_name(name: &str) -> RoomResult<String> {
    let sanitized: String = name.trim().chars().take(MAX_NAME_CHARS).collect();
    let sanitized = sanitized.trim_end().to_string();
    if sanitized.is_empty() {
        return Err(RoomError::Validation(
            "Valid user name is required".to_string(),
        ));
    }
    Ok(sanitized)
}

fn sanitize_emoji(emoji: &str) -> RoomResult<String> {
    let emoji = emoji.trim();
    if emoji.is_empty() {
        return Err(RoomError::Validation("Emoji is required".to_string()));
    }
    if emoji.chars().count() > MAX_EMOJI_CHARS {
        return Err(RoomError::Validation("Emoji is too long".to_string()));
    }
    Ok(emoji.to_string())
}

impl Room {
    pub fn new(code: RoomCode, name: String) -> Self {
        let now = Utc::now();
        Self {
            code,
            name,
            participants: Vec::new(),
            phase: VotingPhase::Collecting,
            ballots: HashMap::new(),
            created_at: now,
            last_activity: now,
        }
    }

    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn participant_mut(&mut self, id: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == id)
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Add a new participant. Validation happens before anything is written.
    pub fn join(
        &mut self,
        display_name: &str,
        spectator: bool,
        capacity: usize,
    ) -> RoomResult<Participant> {
        let name = sanitize_display_name(display_name)?;

        if self.participants.len() >= capacity {
            return Err(RoomError::RoomFull);
        }

        let lowered = name.to_lowercase();
        if self
            .participants
            .iter()
            .any(|p| p.name.to_lowercase() == lowered)
        {
            return Err(RoomError::NameTaken(name));
        }

        let avatar = {
            let used: HashSet<&str> = self
                .participants
                .iter()
                .map(|p| p.avatar.emoji.as_str())
                .collect();
            allocate_avatar(&used)
        };

        let participant = Participant {
            id: ulid::Ulid::new().to_string(),
            name,
            avatar,
            connected: true,
            is_spectator: spectator,
            presence_epoch: 0,
        };

        self.participants.push(participant.clone());
        self.touch();
        Ok(participant)
    }

    /// Record or withdraw a ballot. Allowed in either phase.
    pub fn cast_vote(&mut self, participant_id: &str, signal: VoteSignal) -> RoomResult<Participant> {
        let participant = self
            .participant(participant_id)
            .cloned()
            .ok_or(RoomError::UserNotFound)?;

        match signal {
            VoteSignal::Cast(vote) => {
                self.ballots.insert(participant.id.clone(), vote);
            }
            VoteSignal::Withdraw => {
                self.ballots.remove(&participant.id);
            }
        }

        self.touch();
        Ok(participant)
    }

    /// Show all ballots. Repeating a reveal recomputes the same stats.
    pub fn reveal(&mut self) -> VoteStats {
        self.phase = VotingPhase::Revealed;
        self.touch();
        compute_stats(self.ballots.values())
    }

    /// Clear every ballot and start collecting again
    pub fn reset(&mut self) {
        self.ballots.clear();
        self.phase = VotingPhase::Collecting;
        self.touch();
    }

    /// Remove a participant together with their ballot
    pub fn remove_participant(&mut self, participant_id: &str) -> Option<Participant> {
        let index = self
            .participants
            .iter()
            .position(|p| p.id == participant_id)?;
        let participant = self.participants.remove(index);
        self.ballots.remove(participant_id);
        self.touch();
        Some(participant)
    }

    pub fn is_idle(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        self.participants.is_empty() && now.signed_duration_since(self.last_activity) > ttl
    }
}

impl AppState {
    async fn room_or_not_found(&self, code: &str) -> RoomResult<Arc<Mutex<Room>>> {
        self.get_room(code).await.ok_or(RoomError::RoomNotFound)
    }

    /// Create a room and return its code
    pub async fn create_room(&self, display_name: &str) -> RoomResult<RoomCode> {
        let name = display_name.trim();
        if name.is_empty() {
            return Err(RoomError::Validation("Team name is required".to_string()));
        }

        let mut rooms = self.rooms.write().await;
        let code = loop {
            let code = generate_room_code();
            if !rooms.contains_key(&code) {
                break code;
            }
            tracing::debug!("Room code collision on {}, regenerating", code);
        };

        let room = Room::new(code.clone(), name.to_string());
        rooms.insert(code.clone(), Arc::new(Mutex::new(room)));
        tracing::info!("Created room {} ({})", code, name);

        Ok(code)
    }

    /// Join a room as a new participant
    pub async fn join_room(
        &self,
        code: &str,
        display_name: &str,
        spectator: bool,
    ) -> RoomResult<(Participant, RoomView)> {
        let room = self.room_or_not_found(code).await?;
        let mut room = room.lock().await;

        let participant = room.join(display_name, spectator, self.config.room_capacity)?;
        tracing::info!(
            "{} joined room {} ({}/{})",
            participant.name,
            room.code,
            room.participants.len(),
            self.config.room_capacity
        );

        self.connections
            .dispatch(&room, None, |_, view| ServerMessage::ParticipantJoined {
                participant: participant.clone(),
                room: view,
            })
            .await;

        let view = room.view_for(Some(participant.id.as_str()));
        Ok((participant, view))
    }

    /// Cast or withdraw a vote and push the personalized result to the room
    pub async fn cast_vote(
        &self,
        code: &str,
        participant_id: &str,
        signal: VoteSignal,
    ) -> RoomResult<()> {
        let room = self.room_or_not_found(code).await?;
        let mut room = room.lock().await;

        let participant = room.cast_vote(participant_id, signal)?;
        tracing::debug!("{} voted in room {}: {:?}", participant.name, room.code, signal);

        let phase = room.phase;
        self.connections
            .dispatch(&room, None, |viewer, view| ServerMessage::VoteCast {
                participant: participant.clone(),
                vote: match signal {
                    VoteSignal::Cast(vote) => {
                        Some(visible_ballot(phase, &participant.id, Some(viewer), vote))
                    }
                    VoteSignal::Withdraw => None,
                },
                room: view,
            })
            .await;

        Ok(())
    }

    /// Reveal all ballots and broadcast them with statistics
    pub async fn reveal_votes(&self, code: &str) -> RoomResult<VoteStats> {
        let room = self.room_or_not_found(code).await?;
        let mut room = room.lock().await;

        let stats = room.reveal();
        tracing::info!(
            "Revealed {} votes in room {} (agreement {})",
            stats.total_votes,
            room.code,
            stats.agreement
        );

        self.connections
            .dispatch(&room, None, |_, view| ServerMessage::VotesRevealed {
                room: view,
                stats: stats.clone(),
            })
            .await;

        Ok(stats)
    }

    /// Clear ballots and return to collecting
    pub async fn reset_votes(&self, code: &str) -> RoomResult<()> {
        let room = self.room_or_not_found(code).await?;
        let mut room = room.lock().await;

        room.reset();
        tracing::info!("Reset voting in room {}", room.code);

        self.connections
            .dispatch(&room, None, |_, view| ServerMessage::VotingReset { room: view })
            .await;

        Ok(())
    }

    /// Current room view, masked for `viewer`
    pub async fn room_snapshot(&self, code: &str, viewer: Option<&str>) -> RoomResult<RoomView> {
        let room = self.room_or_not_found(code).await?;
        let room = room.lock().await;
        Ok(room.view_for(viewer))
    }

    /// Relay an emoji thrown at another participant. Not part of room state.
    pub async fn throw_emoji(
        &self,
        code: &str,
        from_participant_id: &str,
        to_participant_id: &str,
        emoji: &str,
    ) -> RoomResult<FlyingEmoji> {
        let emoji = sanitize_emoji(emoji)?;
        let room = self.room_or_not_found(code).await?;
        let room = room.lock().await;

        let from = room
            .participant(from_participant_id)
            .ok_or(RoomError::UserNotFound)?;
        let to = room
            .participant(to_participant_id)
            .ok_or(RoomError::UserNotFound)?;

        let flying_emoji = FlyingEmoji {
            id: ulid::Ulid::new().to_string(),
            emoji,
            from_participant_id: from.id.clone(),
            to_participant: TargetParticipant {
                id: to.id.clone(),
                name: to.name.clone(),
                avatar: to.avatar.clone(),
            },
            timestamp: Utc::now(),
        };

        self.connections
            .dispatch(&room, None, |_, view| ServerMessage::EmojiFlying {
                flying_emoji: flying_emoji.clone(),
                room: view,
            })
            .await;

        Ok(flying_emoji)
    }

    /// Relay an emoji a participant shows on their own seat
    pub async fn self_emoji(&self, code: &str, participant_id: &str, emoji: &str) -> RoomResult<()> {
        let emoji = sanitize_emoji(emoji)?;
        let room = self.room_or_not_found(code).await?;
        let room = room.lock().await;

        let participant = room
            .participant(participant_id)
            .ok_or(RoomError::UserNotFound)?;
        let participant_id = participant.id.clone();
        let timestamp = Utc::now();

        self.connections
            .dispatch(&room, None, |_, view| ServerMessage::SelfEmoji {
                participant_id: participant_id.clone(),
                emoji: emoji.clone(),
                timestamp,
                room: view,
            })
            .await;

        Ok(())
    }

    /// Drop empty rooms idle for longer than the configured TTL. Rooms that
    /// are busy right now are skipped until the next pass.
    pub async fn reap_idle_rooms(&self, now: DateTime<Utc>) -> usize {
        let ttl = self.config.room_idle_ttl;
        let mut rooms = self.rooms.write().await;

        let idle: Vec<RoomCode> = rooms
            .iter()
            .filter(|(_, room)| room.try_lock().is_ok_and(|room| room.is_idle(now, ttl)))
            .map(|(code, _)| code.clone())
            .collect();

        for code in &idle {
            rooms.remove(code);
            self.connections.drop_room(code).await;
            tracing::info!("Removed idle room {}", code);
        }

        idle.len()
    }
}
