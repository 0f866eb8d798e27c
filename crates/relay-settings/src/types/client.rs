//! Chat client settings.

use serde::{Deserialize, Serialize};

/// Settings for the chat client's relay subscription and outbound handshake.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Push-channel URL of the relay (`ws://` scheme).
    pub relay_url: String,
    /// Probe attempts before validation gives up.
    pub validation_attempts: u32,
    /// Wait between failed probe attempts, in milliseconds.
    pub validation_retry_delay_ms: u64,
    /// Wait before re-opening a closed push channel, in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Session identifier sent with every outbound message. Generated when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    /// Identical messages from the same sender inside this window are dropped.
    pub duplicate_window_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            relay_url: "ws://127.0.0.1:3000".to_string(),
            validation_attempts: 3,
            validation_retry_delay_ms: 1500,
            reconnect_delay_ms: 5000,
            chat_id: None,
            duplicate_window_ms: 1000,
        }
    }
}
