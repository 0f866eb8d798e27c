//! Chat client error types.

use relay_core::ConnectionStatus;
use thiserror::Error;

/// Errors returned by the chat client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Sending requires a validated outbound target.
    #[error("cannot send while {0}")]
    NotConnected(ConnectionStatus),
    /// Blank messages are not sent.
    #[error("message is empty")]
    EmptyMessage,
    /// Validation requires a URL.
    #[error("webhook URL is empty")]
    EmptyUrl,
    /// Another validation is still running.
    #[error("validation already in progress")]
    ValidationInProgress,
    /// The probe answered with something other than 200.
    #[error("unexpected status {0}")]
    UnexpectedStatus(u16),
    /// Transport-level HTTP failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
