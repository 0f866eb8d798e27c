//! Relay broker: owns the history buffer and the set of live sessions.
//!
//! A single coordinating task processes [`Command`]s in arrival order. Because
//! attach (greeting + history replay + registration) and publish (append +
//! fan-out) both run inside that task, a session never sees a live frame
//! before its replay, and never sees a frame twice.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{counter, gauge};
use relay_core::{ConnectionId, ControlFrame, normalize_traced};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::errors::BrokerError;
use crate::history::HistoryBuffer;
use crate::metrics::{
    BROADCAST_DROPS_TOTAL, HISTORY_SIZE, PAYLOADS_INGESTED_TOTAL, PAYLOADS_UNWRAPPED_TOTAL,
};
use crate::websocket::connection::{ClientConnection, SessionPhase};

/// Commands buffered ahead of the coordinating task.
const COMMAND_QUEUE_DEPTH: usize = 256;

/// Outcome of publishing one payload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Sessions the frame was queued on.
    pub recipients: usize,
    /// Sessions removed because the frame could not be queued.
    pub dropped: usize,
    /// History length after the append.
    pub buffered: usize,
    /// Field that held an embedded JSON document, if one was unwrapped.
    pub unwrapped_from: Option<String>,
}

/// Point-in-time broker counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BrokerStats {
    /// Live sessions.
    pub clients: usize,
    /// Frames in the history buffer.
    pub buffer_size: usize,
}

enum Command {
    Publish {
        payload: Value,
        reply: oneshot::Sender<PublishReport>,
    },
    Attach {
        connection: Arc<ClientConnection>,
        reply: oneshot::Sender<Result<usize, BrokerError>>,
    },
    Detach {
        id: ConnectionId,
    },
    Stats {
        reply: oneshot::Sender<BrokerStats>,
    },
}

/// State mutated only by the coordinating task.
struct BrokerState {
    history: HistoryBuffer,
    sessions: HashMap<ConnectionId, Arc<ClientConnection>>,
}

impl BrokerState {
    fn new(history_capacity: usize) -> Self {
        Self {
            history: HistoryBuffer::new(history_capacity),
            sessions: HashMap::new(),
        }
    }

    fn publish(&mut self, raw: Value) -> PublishReport {
        let normalized = normalize_traced(raw);
        let frame = Arc::new(normalized.payload.to_string());
        let _ = self.history.append(frame.clone());

        let mut recipients = 0;
        let mut failed = Vec::new();
        for (id, connection) in &self.sessions {
            if connection.send(frame.clone()) {
                recipients += 1;
            } else {
                failed.push(id.clone());
            }
        }
        for id in &failed {
            if let Some(connection) = self.sessions.remove(id) {
                warn!(connection_id = %id, "fan-out failed, closing session");
                connection.close();
            }
        }

        counter!(PAYLOADS_INGESTED_TOTAL).increment(1);
        if normalized.unwrapped_from.is_some() {
            counter!(PAYLOADS_UNWRAPPED_TOTAL).increment(1);
        }
        if !failed.is_empty() {
            counter!(BROADCAST_DROPS_TOTAL).increment(failed.len() as u64);
        }
        #[allow(clippy::cast_precision_loss)]
        gauge!(HISTORY_SIZE).set(self.history.len() as f64);

        PublishReport {
            recipients,
            dropped: failed.len(),
            buffered: self.history.len(),
            unwrapped_from: normalized.unwrapped_from,
        }
    }

    /// Queue the greeting and the history snapshot, then register the session.
    fn attach(&mut self, connection: Arc<ClientConnection>) -> Result<usize, BrokerError> {
        let _ = connection.advance(SessionPhase::Replaying);
        let snapshot = self.history.snapshot();
        let greeting = Arc::new(ControlFrame::greeting().to_json());

        let delivered =
            connection.send(greeting) && snapshot.iter().all(|frame| connection.send(frame.clone()));
        if !delivered {
            connection.close();
            return Err(BrokerError::SessionClosed(connection.id.clone()));
        }

        let _ = connection.advance(SessionPhase::Live);
        let replayed = snapshot.len();
        let _ = self.sessions.insert(connection.id.clone(), connection);
        Ok(replayed)
    }

    fn detach(&mut self, id: &ConnectionId) -> bool {
        match self.sessions.remove(id) {
            Some(connection) => {
                connection.close();
                true
            }
            None => false,
        }
    }

    fn stats(&self) -> BrokerStats {
        BrokerStats {
            clients: self.sessions.len(),
            buffer_size: self.history.len(),
        }
    }

    fn close_all(&mut self) {
        for (_, connection) in self.sessions.drain() {
            connection.close();
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Publish { payload, reply } => {
                let report = self.publish(payload);
                match &report.unwrapped_from {
                    Some(field) => info!(
                        field = field.as_str(),
                        recipients = report.recipients,
                        "relayed payload, unwrapped embedded JSON"
                    ),
                    None => info!(recipients = report.recipients, "relayed payload"),
                }
                let _ = reply.send(report);
            }
            Command::Attach { connection, reply } => {
                let id = connection.id.clone();
                let result = self.attach(connection);
                match &result {
                    Ok(replayed) => debug!(connection_id = %id, replayed, "session live"),
                    Err(error) => warn!(connection_id = %id, %error, "history replay failed"),
                }
                let _ = reply.send(result);
            }
            Command::Detach { id } => {
                if self.detach(&id) {
                    debug!(connection_id = %id, "session detached");
                }
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }
}

/// Cloneable handle to the coordinating task.
#[derive(Clone)]
pub struct RelayBroker {
    tx: mpsc::Sender<Command>,
}

impl RelayBroker {
    /// Spawn the coordinating task. It stops when `cancel` fires.
    pub fn spawn(config: &ServerConfig, cancel: CancellationToken) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let mut state = BrokerState::new(config.history_capacity);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    command = rx.recv() => match command {
                        Some(command) => state.handle(command),
                        None => break,
                    },
                }
            }
            let open = state.sessions.len();
            state.close_all();
            info!(closed_sessions = open, "relay broker stopped");
        });
        (Self { tx }, handle)
    }

    /// Normalize a payload, retain it, and fan it out to live sessions.
    pub async fn publish(&self, payload: Value) -> Result<PublishReport, BrokerError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Publish { payload, reply }, rx).await
    }

    /// Replay the greeting and history to a session, then make it live.
    ///
    /// Returns the number of history frames replayed.
    pub async fn attach(&self, connection: Arc<ClientConnection>) -> Result<usize, BrokerError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Attach { connection, reply }, rx)
            .await?
    }

    /// Remove a session from the fan-out set.
    pub async fn detach(&self, id: &ConnectionId) {
        let _ = self.tx.send(Command::Detach { id: id.clone() }).await;
    }

    /// Current session and buffer counts.
    pub async fn stats(&self) -> Result<BrokerStats, BrokerError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Stats { reply }, rx).await
    }

    async fn request<T>(&self, command: Command, rx: oneshot::Receiver<T>) -> Result<T, BrokerError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| BrokerError::Stopped)?;
        rx.await.map_err(|_| BrokerError::Stopped)
    }
}
