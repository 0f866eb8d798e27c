//! Push-channel session lifecycle, from upgrade through disconnect.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use relay_core::ConnectionId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::broker::RelayBroker;
use crate::config::ServerConfig;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Run a session for one upgraded socket.
///
/// 1. Spawns the writer (queued frames, periodic pings, per-write timeout)
/// 2. Spawns the heartbeat that closes quiet sessions
/// 3. Attaches to the broker, which queues the greeting and history
/// 4. Reads until the client leaves, the session closes, or shutdown
/// 5. Detaches and records metrics
#[instrument(skip_all, fields(connection_id = %id))]
pub async fn run_ws_session(
    ws: WebSocket,
    id: ConnectionId,
    broker: RelayBroker,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
) {
    let (ws_tx, mut ws_rx) = ws.split();
    let (send_tx, send_rx) = mpsc::channel::<Arc<String>>(config.session_queue_capacity());
    let connection = Arc::new(ClientConnection::new(id.clone(), send_tx));

    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let writer = tokio::spawn(write_frames(ws_tx, send_rx, connection.clone(), config.clone()));
    let heartbeat = {
        let connection = connection.clone();
        let interval = config.heartbeat_interval();
        let timeout = config.heartbeat_timeout();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if run_heartbeat(connection.clone(), interval, timeout, shutdown).await
                == HeartbeatResult::TimedOut
            {
                warn!(?timeout, "client unresponsive, closing session");
                connection.close();
            }
        })
    };

    match broker.attach(connection.clone()).await {
        Ok(replayed) => debug!(replayed, "history replayed"),
        Err(error) => {
            warn!(%error, "session not attached");
            connection.close();
        }
    }

    loop {
        tokio::select! {
            () = connection.closed() => break,
            () = shutdown.cancelled() => break,
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Close(_))) => {
                    debug!("client sent close frame");
                    break;
                }
                // Client frames carry no protocol meaning; any traffic counts as liveness.
                Some(Ok(_)) => connection.mark_alive(),
                Some(Err(error)) => {
                    debug!(%error, "socket read failed");
                    break;
                }
                None => break,
            },
        }
    }

    connection.close();
    broker.detach(&id).await;
    let _ = writer.await;
    heartbeat.abort();

    info!(dropped = connection.drop_count(), "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
}

/// Drain the session queue into the socket, sending pings between frames.
///
/// Ends when the session closes, a write fails or a write exceeds the
/// send timeout. Closes the session on exit.
async fn write_frames(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<Arc<String>>,
    connection: Arc<ClientConnection>,
    config: Arc<ServerConfig>,
) {
    let send_timeout = config.send_timeout();
    let mut ping = tokio::time::interval(config.heartbeat_interval());
    let _ = ping.tick().await;

    loop {
        let message = tokio::select! {
            biased;
            frame = send_rx.recv() => match frame {
                Some(text) => Message::Text(text.as_str().into()),
                None => break,
            },
            () = connection.closed() => break,
            _ = ping.tick() => Message::Ping(axum::body::Bytes::new()),
        };
        match tokio::time::timeout(send_timeout, ws_tx.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                debug!(%error, "socket write failed");
                break;
            }
            Err(_) => {
                warn!(?send_timeout, "socket write timed out");
                break;
            }
        }
    }

    connection.close();
    let _ = tokio::time::timeout(send_timeout, ws_tx.close()).await;
}
