//! # relay-client
//!
//! Client half of the webhook relay protocol.
//!
//! - [`OutboundValidator`]: bounded-retry `GET` probe that unlocks sending
//! - [`ChatClient`]: connection status, strict-200 send, local message log
//! - [`ReconnectingSubscriber`]: keeps one push channel open, reconnecting
//!   after a fixed delay forever
//! - [`MessageLog`]: ordered message sequence with short-window duplicate
//!   suppression

#![deny(unsafe_code)]

pub mod chat;
pub mod config;
pub mod errors;
pub mod messages;
pub mod subscriber;
pub mod validator;

pub use chat::{ChatClient, SendOutcome};
pub use config::ClientConfig;
pub use errors::ClientError;
pub use messages::MessageLog;
pub use subscriber::{InboundState, ReconnectingSubscriber};
pub use validator::{OutboundValidator, ValidationOutcome};
