//! Server configuration.

use std::time::Duration;

use relay_settings::ServerSettings;
use serde::{Deserialize, Serialize};

/// Slots kept free for live frames after the greeting and a full replay.
pub const REPLAY_HEADROOM: usize = 64;

/// Configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `3000`, `0` for auto-assign).
    pub port: u16,
    /// Payloads kept for replay to late joiners.
    pub history_capacity: usize,
    /// Ping interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Close a session after this much silence, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Per-frame write timeout in milliseconds.
    pub send_timeout_ms: u64,
    /// Outbound frames buffered per session.
    pub session_queue_depth: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Max ingestion body size in bytes.
    pub max_body_bytes: usize,
}

impl ServerConfig {
    /// Ping interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Silence tolerated before a session is dropped.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Per-frame write timeout.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Queue depth for one session.
    ///
    /// Never below the greeting plus a full history replay plus
    /// [`REPLAY_HEADROOM`], so attaching cannot overflow the queue.
    pub fn session_queue_capacity(&self) -> usize {
        self.session_queue_depth
            .max(self.history_capacity.saturating_add(1 + REPLAY_HEADROOM))
    }

    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            history_capacity: s.history_capacity,
            heartbeat_interval_ms: s.heartbeat_interval_ms,
            heartbeat_timeout_ms: s.heartbeat_timeout_ms,
            send_timeout_ms: s.send_timeout_ms,
            session_queue_depth: s.session_queue_depth,
            max_message_size: s.max_message_size,
            max_body_bytes: s.max_body_bytes,
        }
    }
}
