//! Push-channel sessions: per-connection state, liveness, and the socket loop.

pub mod connection;
pub mod heartbeat;
pub mod session;
