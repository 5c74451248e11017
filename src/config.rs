//! Server configuration loaded from environment variables

use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_ROOM_CAPACITY: usize = 10;
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);
pub const DEFAULT_ROOM_IDLE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Maximum participants per room
    pub room_capacity: usize,
    /// How long a disconnected participant keeps their seat
    pub grace_period: Duration,
    /// Empty rooms idle for longer than this are dropped by the reaper
    pub room_idle_ttl: Duration,
    pub reap_interval: Duration,
    /// Directory with the built front-end, served as fallback
    pub static_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            room_capacity: DEFAULT_ROOM_CAPACITY,
            grace_period: DEFAULT_GRACE_PERIOD,
            room_idle_ttl: DEFAULT_ROOM_IDLE_TTL,
            reap_interval: DEFAULT_REAP_INTERVAL,
            static_dir: "dist".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            port: env_parse("PORT", defaults.port),
            room_capacity: env_parse("ROOM_CAPACITY", defaults.room_capacity).max(1),
            grace_period: Duration::from_secs(env_parse(
                "GRACE_PERIOD_SECS",
                defaults.grace_period.as_secs(),
            )),
            room_idle_ttl: Duration::from_secs(env_parse(
                "ROOM_IDLE_TTL_SECS",
                defaults.room_idle_ttl.as_secs(),
            )),
            reap_interval: Duration::from_secs(
                env_parse("REAP_INTERVAL_SECS", defaults.reap_interval.as_secs()).max(1),
            ),
            static_dir: std::env::var("STATIC_DIR")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.static_dir),
        };

        tracing::info!(
            "Config: port={}, capacity={}, grace={:?}, idle_ttl={:?}",
            config.port,
            config.room_capacity,
            config.grace_period,
            config.room_idle_ttl
        );

        config
    }
}

fn env_parse<T: FromStr + Copy + std::fmt::Debug>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Invalid {}={:?}, using default {:?}", key, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}
