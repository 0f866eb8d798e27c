//! Chat data model shared by relay clients and their front-ends.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::MessageId;
use crate::payload::extract_display_text;

/// Format an instant as ISO-8601 with millisecond precision and a `Z` suffix.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Who produced a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SenderType {
    /// Typed by the local user.
    User,
    /// Relayed from the workflow engine.
    Bot,
    /// Local status notice.
    System,
}

/// Diagnostics attached to relay-originated messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DebugInfo {
    /// HTTP-equivalent status of the delivery.
    pub status: u16,
    /// The normalized payload as received.
    pub body: Value,
    /// Receipt time, ISO-8601.
    pub timestamp: String,
}

impl DebugInfo {
    /// Debug info for a payload received over the push channel just now.
    pub fn relayed(body: Value) -> Self {
        Self {
            status: 200,
            body,
            timestamp: iso_timestamp(Utc::now()),
        }
    }
}

/// One entry in a client's message sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique within the running client session.
    pub id: MessageId,
    /// Display text.
    pub text: String,
    /// Origin of the message.
    pub sender: SenderType,
    /// When the message entered the sequence.
    pub timestamp: DateTime<Utc>,
    /// Present on messages that came from the relay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<DebugInfo>,
}

impl Message {
    /// Create a message stamped now.
    pub fn new(text: impl Into<String>, sender: SenderType, debug_info: Option<DebugInfo>) -> Self {
        Self {
            id: MessageId::new(),
            text: text.into(),
            sender,
            timestamp: Utc::now(),
            debug_info,
        }
    }

    /// A message typed by the user.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(text, SenderType::User, None)
    }

    /// A local status notice.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(text, SenderType::System, None)
    }

    /// Wrap a relayed payload as a bot message with debug info.
    pub fn from_relay(body: Value) -> Self {
        let text = extract_display_text(&body);
        Self::new(text, SenderType::Bot, Some(DebugInfo::relayed(body)))
    }
}

/// Outbound connection state of a chat client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionStatus {
    /// No validation attempted yet.
    #[default]
    Idle,
    /// Validation in progress.
    Connecting,
    /// Outbound target validated; sending allowed.
    Connected,
    /// Validation exhausted its attempts.
    Error,
}

impl ConnectionStatus {
    /// Whether messages may be sent in this state.
    pub fn can_send(self) -> bool {
        self == Self::Connected
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "IDLE",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// Body posted to the workflow engine for each user message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    /// The user's text.
    pub message: String,
    /// Send time, ISO-8601.
    pub timestamp: String,
    /// Client session identifier.
    pub chat_id: String,
}

impl OutboundMessage {
    /// Build an outbound body stamped now.
    pub fn new(message: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: iso_timestamp(Utc::now()),
            chat_id: chat_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn iso_timestamp_has_millis_and_z() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(iso_timestamp(at), "2026-01-02T03:04:05.000Z");
    }

    #[test]
    fn relay_message_carries_debug_info() {
        let msg = Message::from_relay(json!({"message": "hello", "extra": 1}));
        assert_eq!(msg.text, "hello");
        assert_eq!(msg.sender, SenderType::Bot);
        let debug = msg.debug_info.unwrap();
        assert_eq!(debug.status, 200);
        assert_eq!(debug.body["extra"], 1);
        assert!(debug.timestamp.ends_with('Z'));
    }

    #[test]
    fn user_and_system_messages_have_no_debug_info() {
        assert!(Message::user("hi").debug_info.is_none());
        assert_eq!(Message::system("note").sender, SenderType::System);
    }

    #[test]
    fn message_serializes_camel_case() {
        let msg = Message::from_relay(json!({"text": "t"}));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["sender"], "BOT");
        assert!(value.get("debugInfo").is_some());

        let plain = serde_json::to_value(Message::user("u")).unwrap();
        assert!(plain.get("debugInfo").is_none());
    }

    #[test]
    fn only_connected_can_send() {
        assert!(ConnectionStatus::Connected.can_send());
        for status in [
            ConnectionStatus::Idle,
            ConnectionStatus::Connecting,
            ConnectionStatus::Error,
        ] {
            assert!(!status.can_send());
        }
    }

    #[test]
    fn status_display_matches_wire() {
        let wire = serde_json::to_value(ConnectionStatus::Connecting).unwrap();
        assert_eq!(wire, json!(ConnectionStatus::Connecting.to_string()));
    }

    #[test]
    fn outbound_message_wire_shape() {
        let body = serde_json::to_value(OutboundMessage::new("hi", "chat-1")).unwrap();
        assert_eq!(body["message"], "hi");
        assert_eq!(body["chatId"], "chat-1");
        assert!(body["timestamp"].is_string());
    }
}
