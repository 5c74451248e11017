pub mod avatar;
mod presence;
mod room;
pub mod visibility;
pub mod vote;

use room::normalize_room_code;

use crate::broadcast::ConnectionRegistry;
use crate::config::ServerConfig;
use crate::types::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tokio::task::AbortHandle;

/// A scheduled grace-period removal, tagged with the presence epoch it
/// was scheduled for
#[derive(Debug)]
struct PendingRemoval {
    epoch: u64,
    handle: AbortHandle,
}

/// Shared application state.
///
/// The room map is only locked long enough to find or insert a room; every
/// mutation then runs under that room's own mutex, so rooms never contend
/// with each other. Lock order is room, then connection registry, then
/// pending removals.
pub struct AppState {
    pub config: ServerConfig,
    pub rooms: RwLock<HashMap<RoomCode, Arc<Mutex<Room>>>>,
    pub connections: ConnectionRegistry,
    pending_removals: Mutex<HashMap<(RoomCode, ParticipantId), PendingRemoval>>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            rooms: RwLock::new(HashMap::new()),
            connections: ConnectionRegistry::new(),
            pending_removals: Mutex::new(HashMap::new()),
            started_at: Instant::now(),
        }
    }

    /// Look up a room by code (case-insensitive)
    pub async fn get_room(&self, code: &str) -> Option<Arc<Mutex<Room>>> {
        let code = normalize_room_code(code);
        self.rooms.read().await.get(&code).cloned()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Number of grace-period removals currently scheduled
    pub async fn pending_removal_count(&self) -> usize {
        self.pending_removals.lock().await.len()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}
