use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Opaque ID types for type safety
pub type RoomCode = String;
pub type ParticipantId = String;
pub type ConnectionId = String;

/// Point values a participant can pick, in display order
pub const POINT_VALUES: &[u8] = &[0, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89];

/// Wire marker for the "no idea" card
pub const UNKNOWN_MARKER: &str = "?";
/// Wire marker for withdrawing a cast vote
pub const WITHDRAW_MARKER: &str = "REMOVE_VOTE";
/// Wire marker replacing another participant's ballot while votes are hidden
pub const HIDDEN_MARKER: &str = "***";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VotingPhase {
    Collecting,
    Revealed,
}

/// A ballot that can be stored in a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum VoteValue {
    Points(u8),
    Unknown,
}

impl VoteValue {
    pub fn points(&self) -> Option<u8> {
        match self {
            VoteValue::Points(p) => Some(*p),
            VoteValue::Unknown => None,
        }
    }
}

impl fmt::Display for VoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteValue::Points(p) => write!(f, "{}", p),
            VoteValue::Unknown => f.write_str(UNKNOWN_MARKER),
        }
    }
}

impl TryFrom<Value> for VoteValue {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match &value {
            Value::Number(n) => n
                .as_u64()
                .and_then(|n| u8::try_from(n).ok())
                .filter(|n| POINT_VALUES.contains(n))
                .map(VoteValue::Points)
                .ok_or_else(|| format!("Invalid vote value: {}", value)),
            Value::String(s) if s == UNKNOWN_MARKER => Ok(VoteValue::Unknown),
            _ => Err(format!("Invalid vote value: {}", value)),
        }
    }
}

impl From<VoteValue> for Value {
    fn from(vote: VoteValue) -> Self {
        match vote {
            VoteValue::Points(p) => Value::from(p),
            VoteValue::Unknown => Value::from(UNKNOWN_MARKER),
        }
    }
}

/// What a participant submits: a ballot, or the withdrawal of their ballot.
///
/// Withdrawal is kept apart from [`VoteValue::Unknown`] so that a retracted
/// vote never shows up in statistics as a "?" card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum VoteSignal {
    Cast(VoteValue),
    Withdraw,
}

impl TryFrom<Value> for VoteSignal {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match &value {
            Value::Null => Ok(VoteSignal::Withdraw),
            Value::String(s) if s == WITHDRAW_MARKER => Ok(VoteSignal::Withdraw),
            _ => VoteValue::try_from(value).map(VoteSignal::Cast),
        }
    }
}

impl From<VoteSignal> for Value {
    fn from(signal: VoteSignal) -> Self {
        match signal {
            VoteSignal::Cast(vote) => vote.into(),
            VoteSignal::Withdraw => Value::from(WITHDRAW_MARKER),
        }
    }
}

/// A ballot as seen by one particular viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum VisibleBallot {
    Value(VoteValue),
    Hidden,
}

impl TryFrom<Value> for VisibleBallot {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match &value {
            Value::String(s) if s == HIDDEN_MARKER => Ok(VisibleBallot::Hidden),
            _ => VoteValue::try_from(value).map(VisibleBallot::Value),
        }
    }
}

impl From<VisibleBallot> for Value {
    fn from(ballot: VisibleBallot) -> Self {
        match ballot {
            VisibleBallot::Value(vote) => vote.into(),
            VisibleBallot::Hidden => Value::from(HIDDEN_MARKER),
        }
    }
}

/// Visual identity shown on a participant's seat
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Avatar {
    pub emoji: String,
    pub color: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub avatar: Avatar,
    pub connected: bool,
    #[serde(default)]
    pub is_spectator: bool,
    /// Bumped on every disconnect and reconnect; a pending removal only acts
    /// if the epoch it was scheduled with is still current.
    #[serde(skip)]
    pub presence_epoch: u64,
}

/// Server-side room state. Never sent as is; see [`RoomView`].
#[derive(Debug, Clone)]
pub struct Room {
    pub code: RoomCode,
    pub name: String,
    /// Join order
    pub participants: Vec<Participant>,
    pub phase: VotingPhase,
    pub ballots: HashMap<ParticipantId, VoteValue>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Room snapshot personalized for one viewer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomView {
    pub code: RoomCode,
    pub name: String,
    pub participants: Vec<Participant>,
    pub phase: VotingPhase,
    pub votes: HashMap<ParticipantId, VisibleBallot>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate statistics computed on reveal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteStats {
    pub total_votes: u32,
    /// Mean of numeric ballots, one decimal
    pub average: f64,
    pub distribution: std::collections::BTreeMap<String, u32>,
    /// Share of voters agreeing with the most common ballot, two decimals
    pub agreement: f64,
}

/// Emoji thrown from one participant at another
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlyingEmoji {
    pub id: String,
    pub emoji: String,
    pub from_participant_id: ParticipantId,
    pub to_participant: TargetParticipant,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetParticipant {
    pub id: ParticipantId,
    pub name: String,
    pub avatar: Avatar,
}
