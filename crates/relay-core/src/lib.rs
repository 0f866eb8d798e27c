//! # relay-core
//!
//! Shared vocabulary for the webhook relay and its chat clients.
//!
//! - **Payload normalization**: single-level unwrap of JSON smuggled inside a
//!   string field, plus display-text extraction
//! - **Frames**: the reserved `SYSTEM` control frame and inbound frame
//!   classification for the push channel
//! - **Chat model**: `Message`, `DebugInfo`, `SenderType`, `ConnectionStatus`
//! - **Branded IDs**: `MessageId`, `ConnectionId`
//! - **Logging**: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod chat;
pub mod frame;
pub mod ids;
pub mod logging;
pub mod payload;

pub use chat::{
    ConnectionStatus, DebugInfo, Message, OutboundMessage, SenderType, iso_timestamp,
};
pub use frame::{ControlFrame, GREETING_TEXT, InboundFrame, SYSTEM_FRAME_TYPE};
pub use ids::{ConnectionId, MessageId};
pub use payload::{MESSAGE_FIELDS, Normalized, extract_display_text, normalize, normalize_traced};
