//! Push-channel connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use relay_core::ConnectionId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a session. Phases only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionPhase {
    /// Upgrade completed, nothing sent yet.
    Open,
    /// Greeting and history are being queued.
    Replaying,
    /// Receiving live fan-out.
    Live,
    /// Terminal. Nothing more is delivered.
    Closed,
}

/// A connected push-channel subscriber.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Send channel to the socket write task.
    tx: mpsc::Sender<Arc<String>>,
    phase: Mutex<SessionPhase>,
    closed: CancellationToken,
    connected_at: Instant,
    /// Whether the client has shown activity since the last heartbeat tick.
    pub is_alive: AtomicBool,
    /// Frames that could not be queued.
    pub dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection in the `Open` phase.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            tx,
            phase: Mutex::new(SessionPhase::Open),
            closed: CancellationToken::new(),
            connected_at: Instant::now(),
            is_alive: AtomicBool::new(true),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Queue a serialized frame for the write task.
    ///
    /// Returns `false` if the session is closed or its queue is full or gone.
    pub fn send(&self, frame: Arc<String>) -> bool {
        if self.is_closed() {
            return false;
        }
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        *self.phase.lock()
    }

    /// Move to `next` if it is later than the current phase.
    ///
    /// Returns whether the phase changed.
    pub fn advance(&self, next: SessionPhase) -> bool {
        let mut phase = self.phase.lock();
        if next > *phase {
            *phase = next;
            true
        } else {
            false
        }
    }

    /// Enter the terminal phase and wake everything waiting on [`closed`](Self::closed).
    pub fn close(&self) {
        let _ = self.advance(SessionPhase::Closed);
        self.closed.cancel();
    }

    /// Whether the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the session is closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Record client activity.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Check and reset the alive flag.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the upgrade completed.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
