//! Relay server error types.

use relay_core::ConnectionId;
use thiserror::Error;

/// Errors returned by the [`RelayBroker`](crate::broker::RelayBroker) handle.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The coordinating task has exited (shutdown in progress).
    #[error("relay broker is not running")]
    Stopped,
    /// The session could not take the greeting or its history replay.
    #[error("session {0} closed before history replay completed")]
    SessionClosed(ConnectionId),
}

/// Errors starting or running the HTTP server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding the listen socket failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Other socket-level failure.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}
