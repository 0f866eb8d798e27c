//! Push-channel frames.
//!
//! Every server-to-client frame is a JSON text frame. One shape is reserved
//! for relay housekeeping, `{"type": "SYSTEM", "text": ...}`; clients consume
//! it and never show it as chat content. Anything else is a normalized payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `type` tag of the reserved control frame.
pub const SYSTEM_FRAME_TYPE: &str = "SYSTEM";

/// Text of the greeting sent to every session on open.
pub const GREETING_TEXT: &str = "connected";

/// Relay housekeeping frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFrame {
    /// Always [`SYSTEM_FRAME_TYPE`].
    #[serde(rename = "type")]
    pub kind: String,
    /// Free-form status text.
    pub text: String,
}

impl ControlFrame {
    /// Build a `SYSTEM` frame with the given text.
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            kind: SYSTEM_FRAME_TYPE.to_owned(),
            text: text.into(),
        }
    }

    /// The greeting sent before history replay.
    pub fn greeting() -> Self {
        Self::system(GREETING_TEXT)
    }

    /// Serialize to the wire form.
    pub fn to_json(&self) -> String {
        serde_json::json!({ "type": self.kind, "text": self.text }).to_string()
    }
}

/// A decoded frame received by a subscriber.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundFrame {
    /// Relay housekeeping; not chat content.
    Control {
        /// Status text carried by the frame.
        text: String,
    },
    /// A relayed, normalized payload.
    Payload(Value),
}

impl InboundFrame {
    /// Decode a text frame.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(raw)?;
        Ok(Self::classify(value))
    }

    /// Classify an already decoded value.
    ///
    /// Any object tagged `"type": "SYSTEM"` counts as control, including a
    /// relayed payload that happens to carry that tag.
    pub fn classify(value: Value) -> Self {
        if value.get("type").and_then(Value::as_str) == Some(SYSTEM_FRAME_TYPE) {
            let text = value
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            return Self::Control { text };
        }
        Self::Payload(value)
    }
}
