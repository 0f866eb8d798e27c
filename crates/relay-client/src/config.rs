//! Client configuration.

use std::time::Duration;

use relay_settings::ClientSettings;
use uuid::Uuid;

/// Resolved chat client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Push-channel URL of the relay.
    pub relay_url: String,
    /// Probe attempts per validation.
    pub validation_attempts: u32,
    /// Wait between a failed probe and the next.
    pub validation_retry_delay: Duration,
    /// Wait before re-opening a closed push channel.
    pub reconnect_delay: Duration,
    /// Session identifier sent with outbound messages.
    pub chat_id: String,
    /// Duplicate suppression window for the message log.
    pub duplicate_window: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from(&ClientSettings::default())
    }
}

impl From<&ClientSettings> for ClientConfig {
    fn from(s: &ClientSettings) -> Self {
        Self {
            relay_url: s.relay_url.clone(),
            validation_attempts: s.validation_attempts.max(1),
            validation_retry_delay: Duration::from_millis(s.validation_retry_delay_ms),
            reconnect_delay: Duration::from_millis(s.reconnect_delay_ms),
            chat_id: s
                .chat_id
                .clone()
                .unwrap_or_else(|| format!("relay-client-{}", Uuid::now_v7())),
            duplicate_window: Duration::from_millis(s.duplicate_window_ms),
        }
    }
}
