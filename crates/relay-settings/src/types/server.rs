//! Relay server settings.

use serde::{Deserialize, Serialize};

/// Network, history and session settings for the relay process.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port shared by HTTP and the push channel.
    pub port: u16,
    /// Number of recent payloads replayed to new sessions. `0` disables replay.
    pub history_capacity: usize,
    /// Interval between server pings, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// A session silent for this long is closed, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Upper bound on a single frame write to one session, in milliseconds.
    pub send_timeout_ms: u64,
    /// Frames queued per session before it is considered stalled.
    pub session_queue_depth: usize,
    /// Max accepted WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Max accepted ingestion body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            history_capacity: 50,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            send_timeout_ms: 10_000,
            session_queue_depth: 1024,
            max_message_size: 1024 * 1024,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}
