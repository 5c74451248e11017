use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind this connection to a participant; resumes the seat if it exists
    JoinRoom {
        room_code: RoomCode,
        participant_id: ParticipantId,
    },
    /// Pull the current room view
    SyncRequest,
}

/// Push events. Every room event carries a full snapshot personalized for
/// the receiving connection; clients replace their local view with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        connection_id: ConnectionId,
        server_now: DateTime<Utc>,
    },
    Associated {
        participant: Participant,
        room: RoomView,
    },
    Snapshot {
        room: RoomView,
    },
    ParticipantJoined {
        participant: Participant,
        room: RoomView,
    },
    ParticipantDisconnected {
        participant: Participant,
        room: RoomView,
    },
    ParticipantLeft {
        participant: Participant,
        room: RoomView,
    },
    VoteCast {
        participant: Participant,
        /// The cast ballot as this receiver may see it; None on withdrawal
        vote: Option<VisibleBallot>,
        room: RoomView,
    },
    VotesRevealed {
        room: RoomView,
        stats: VoteStats,
    },
    VotingReset {
        room: RoomView,
    },
    EmojiFlying {
        flying_emoji: FlyingEmoji,
        room: RoomView,
    },
    SelfEmoji {
        participant_id: ParticipantId,
        emoji: String,
        timestamp: DateTime<Utc>,
        room: RoomView,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl ServerMessage {
    pub fn error(err: &crate::error::RoomError) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            msg: err.to_string(),
        }
    }
}
