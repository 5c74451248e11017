//! Errors surfaced by room operations.
//!
//! Every variant is detected before any state is written, so a failed
//! operation never leaves a room half-mutated.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Result type for room operations
pub type RoomResult<T> = Result<T, RoomError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("{0}")]
    Validation(String),

    #[error("Room not found")]
    RoomNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("The name \"{0}\" is already taken. Please choose a different name.")]
    NameTaken(String),

    #[error("Room is full")]
    RoomFull,
}

/// Coarse error classes shared by the HTTP and push surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    CapacityExceeded,
}

impl RoomError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RoomError::Validation(_) => ErrorKind::Validation,
            RoomError::RoomNotFound | RoomError::UserNotFound => ErrorKind::NotFound,
            RoomError::NameTaken(_) => ErrorKind::Conflict,
            RoomError::RoomFull => ErrorKind::CapacityExceeded,
        }
    }

    /// Stable code sent in `error` push events
    pub fn code(&self) -> &'static str {
        match self {
            RoomError::Validation(_) => "VALIDATION_ERROR",
            RoomError::RoomNotFound => "ROOM_NOT_FOUND",
            RoomError::UserNotFound => "USER_NOT_FOUND",
            RoomError::NameTaken(_) => "NAME_TAKEN",
            RoomError::RoomFull => "ROOM_FULL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::CapacityExceeded => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl IntoResponse for RoomError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}
