//! HTTP API endpoints.
//!
//! Request-style operations against rooms. Every mutation answers as soon as
//! the room state is committed; pushes to other clients travel over `/ws`.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::{RoomError, RoomResult};
use crate::state::AppState;
use crate::types::*;
use crate::ws;

/// All API routes plus the WebSocket endpoint
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/rooms", post(create_room))
        .route("/api/rooms/{code}", get(get_room))
        .route("/api/rooms/{code}/join", post(join_room))
        .route("/api/rooms/{code}/votes", post(cast_vote))
        .route("/api/rooms/{code}/reveal", post(reveal_votes))
        .route("/api/rooms/{code}/reset", post(reset_votes))
        .route("/api/rooms/{code}/emoji/throw", post(throw_emoji))
        .route("/api/rooms/{code}/emoji/self", post(self_emoji))
        .route("/health", get(health))
        .route("/ws", get(ws::ws_handler))
}

/// Keeps an explicit `null` as `Some(Value::Null)` so it can be told apart
/// from a missing field
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

fn required(value: &str, field: &str) -> RoomResult<()> {
    if value.trim().is_empty() {
        return Err(RoomError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateRoomResponse {
    pub room_code: RoomCode,
}

#[derive(Debug, Deserialize)]
pub struct JoinRoomRequest {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub spectator: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JoinRoomResponse {
    pub participant: Participant,
    pub room: RoomView,
}

#[derive(Debug, Deserialize)]
pub struct CastVoteRequest {
    #[serde(default)]
    pub participant_id: String,
    #[serde(default, deserialize_with = "present")]
    pub vote: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ThrowEmojiRequest {
    #[serde(default)]
    pub from_participant_id: String,
    #[serde(default)]
    pub to_participant_id: String,
    #[serde(default)]
    pub emoji: String,
}

#[derive(Debug, Deserialize)]
pub struct SelfEmojiRequest {
    #[serde(default)]
    pub participant_id: String,
    #[serde(default)]
    pub emoji: String,
}

#[derive(Debug, Deserialize)]
pub struct SnapshotQuery {
    pub participant_id: Option<ParticipantId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoomResponse {
    pub room: RoomView,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub stats: VoteStats,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

const SUCCESS: SuccessResponse = SuccessResponse { success: true };

/// POST /api/rooms
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRoomRequest>,
) -> RoomResult<Json<CreateRoomResponse>> {
    let room_code = state.create_room(&req.display_name).await?;
    Ok(Json(CreateRoomResponse { room_code }))
}

/// GET /api/rooms/{code}?participant_id=
///
/// Without a participant id every ballot is masked while collecting.
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Query(query): Query<SnapshotQuery>,
) -> RoomResult<Json<RoomResponse>> {
    let room = state
        .room_snapshot(&code, query.participant_id.as_deref())
        .await?;
    Ok(Json(RoomResponse { room }))
}

/// POST /api/rooms/{code}/join
pub async fn join_room(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(req): Json<JoinRoomRequest>,
) -> RoomResult<Json<JoinRoomResponse>> {
    required(&req.display_name, "User name")?;
    let (participant, room) = state
        .join_room(&code, &req.display_name, req.spectator)
        .await
        .inspect_err(|e| tracing::warn!("Join to room {} rejected: {}", code, e))?;
    Ok(Json(JoinRoomResponse { participant, room }))
}

/// POST /api/rooms/{code}/votes
pub async fn cast_vote(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(req): Json<CastVoteRequest>,
) -> RoomResult<Json<SuccessResponse>> {
    required(&req.participant_id, "Participant ID")?;
    let vote = req
        .vote
        .ok_or_else(|| RoomError::Validation("Vote is required".to_string()))?;
    let signal = VoteSignal::try_from(vote).map_err(RoomError::Validation)?;

    state.cast_vote(&code, &req.participant_id, signal).await?;
    Ok(Json(SUCCESS))
}

/// POST /api/rooms/{code}/reveal
pub async fn reveal_votes(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> RoomResult<Json<StatsResponse>> {
    let stats = state.reveal_votes(&code).await?;
    Ok(Json(StatsResponse { stats }))
}

/// POST /api/rooms/{code}/reset
pub async fn reset_votes(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> RoomResult<Json<SuccessResponse>> {
    state.reset_votes(&code).await?;
    Ok(Json(SUCCESS))
}

/// POST /api/rooms/{code}/emoji/throw
pub async fn throw_emoji(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(req): Json<ThrowEmojiRequest>,
) -> RoomResult<Json<SuccessResponse>> {
    required(&req.from_participant_id, "From participant ID")?;
    required(&req.to_participant_id, "To participant ID")?;
    state
        .throw_emoji(
            &code,
            &req.from_participant_id,
            &req.to_participant_id,
            &req.emoji,
        )
        .await?;
    Ok(Json(SUCCESS))
}

/// POST /api/rooms/{code}/emoji/self
pub async fn self_emoji(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(req): Json<SelfEmojiRequest>,
) -> RoomResult<Json<SuccessResponse>> {
    required(&req.participant_id, "Participant ID")?;
    state
        .self_emoji(&code, &req.participant_id, &req.emoji)
        .await?;
    Ok(Json(SUCCESS))
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "rooms": state.room_count().await,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
