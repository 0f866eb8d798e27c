//! Liveness monitoring for push-channel sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::connection::ClientConnection;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The client showed no activity within the timeout window.
    TimedOut,
    /// The session closed or the server is shutting down.
    Cancelled,
}

/// Watch a connection's alive flag until it goes quiet for too long.
///
/// Each `interval` tick consumes the alive flag. `timeout / interval`
/// consecutive quiet ticks (at least one) end the loop with `TimedOut`.
pub async fn run_heartbeat(
    connection: Arc<ClientConnection>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval(interval);
    let _ = ticker.tick().await;
    let interval_ms = interval.as_millis().max(1);
    let max_missed = u32::try_from(timeout.as_millis() / interval_ms)
        .unwrap_or(u32::MAX)
        .max(1);
    let mut missed: u32 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if connection.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= max_missed {
                        return HeartbeatResult::TimedOut;
                    }
                }
            }
            () = connection.closed() => return HeartbeatResult::Cancelled,
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
        }
    }
}
