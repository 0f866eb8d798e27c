//! Reconnecting push-channel subscriber.
//!
//! One task alternates between holding a session open and waiting to
//! reconnect, so at most one session exists at a time. Cancellation is
//! observed in every phase, so teardown leaves no socket and no pending timer.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use relay_core::{InboundFrame, Message};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::messages::MessageLog;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Inbound connectivity, for a status indicator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InboundState {
    /// A push-channel session is open.
    pub connected: bool,
    /// Session opens attempted so far.
    pub attempts: u64,
}

/// Handle to the subscriber task. Dropping it cancels the task.
pub struct ReconnectingSubscriber {
    cancel: CancellationToken,
    state: watch::Receiver<InboundState>,
    task: Option<JoinHandle<()>>,
}

impl ReconnectingSubscriber {
    /// Open a session to `url` now and keep one open until shutdown.
    ///
    /// After any close, error or failed open, waits `reconnect_delay` and
    /// tries again, forever. An open that has not completed within
    /// `reconnect_delay` counts as failed.
    pub fn spawn(url: impl Into<String>, reconnect_delay: Duration, log: Arc<MessageLog>) -> Self {
        let cancel = CancellationToken::new();
        let (state_tx, state) = watch::channel(InboundState::default());
        let task = tokio::spawn(run(url.into(), reconnect_delay, log, state_tx, cancel.clone()));
        Self {
            cancel,
            state,
            task: Some(task),
        }
    }

    /// Current inbound state.
    pub fn state(&self) -> InboundState {
        *self.state.borrow()
    }

    /// Receive inbound state changes.
    pub fn watch_state(&self) -> watch::Receiver<InboundState> {
        self.state.clone()
    }

    /// Close the session, cancel any pending reconnect, and wait for the task.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ReconnectingSubscriber {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    url: String,
    reconnect_delay: Duration,
    log: Arc<MessageLog>,
    state: watch::Sender<InboundState>,
    cancel: CancellationToken,
) {
    loop {
        state.send_modify(|s| s.attempts += 1);
        let opened = tokio::select! {
            () = cancel.cancelled() => break,
            opened = tokio::time::timeout(reconnect_delay, connect_async(url.as_str())) => opened,
        };
        match opened {
            Ok(Ok((ws, _))) => {
                info!(url = url.as_str(), "push channel open");
                state.send_modify(|s| s.connected = true);
                read_session(ws, &log, &cancel).await;
                state.send_modify(|s| s.connected = false);
                if cancel.is_cancelled() {
                    break;
                }
                info!(
                    delay_ms = u64::try_from(reconnect_delay.as_millis()).unwrap_or(u64::MAX),
                    "push channel closed, reconnecting"
                );
            }
            Ok(Err(error)) => {
                warn!(url = url.as_str(), %error, "push channel open failed");
            }
            Err(_) => {
                warn!(
                    url = url.as_str(),
                    timeout_ms = u64::try_from(reconnect_delay.as_millis()).unwrap_or(u64::MAX),
                    "push channel open timed out"
                );
            }
        }
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(reconnect_delay) => {}
        }
    }
    debug!("subscriber stopped");
}

/// Read frames until the session ends or `cancel` fires.
async fn read_session(mut ws: WsStream, log: &MessageLog, cancel: &CancellationToken) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = ws.close(None).await;
                return;
            }
            frame = ws.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => handle_frame(text.as_str(), log),
                Some(Ok(WsMessage::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => handle_frame(text, log),
                    Err(_) => debug!(len = data.len(), "ignoring non-UTF8 binary frame"),
                },
                Some(Ok(WsMessage::Close(_))) | None => return,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    debug!(%error, "push channel read failed");
                    return;
                }
            },
        }
    }
}

/// Deliver a relayed payload to the log. Control frames are consumed.
fn handle_frame(raw: &str, log: &MessageLog) {
    match InboundFrame::parse(raw) {
        Ok(InboundFrame::Control { text }) => debug!(text = text.as_str(), "control frame"),
        Ok(InboundFrame::Payload(body)) => {
            let _ = log.push(Message::from_relay(body));
        }
        Err(error) => warn!(%error, "undecodable frame skipped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{ControlFrame, SenderType};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    async fn bind() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        (listener, url)
    }

    /// Accept every connection, send `frames`, then close.
    fn serve_and_close(listener: TcpListener, frames: Vec<String>) -> Arc<AtomicUsize> {
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        let _server = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let _ = counter.fetch_add(1, Ordering::SeqCst);
                let Ok(mut ws) = accept_async(stream).await else { continue };
                for frame in &frames {
                    let _ = ws.send(WsMessage::Text(frame.as_str().into())).await;
                }
                let _ = ws.close(None).await;
            }
        });
        accepted
    }

    #[test]
    fn control_frames_are_consumed() {
        let log = MessageLog::default();
        handle_frame(&ControlFrame::greeting().to_json(), &log);
        assert!(log.is_empty());
    }

    #[test]
    fn payload_frames_become_bot_messages() {
        let log = MessageLog::default();
        handle_frame(r#"{"output":"done","runId":7}"#, &log);
        let messages = log.snapshot();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender, SenderType::Bot);
        assert_eq!(messages[0].text, "done");
        let debug = messages[0].debug_info.as_ref().unwrap();
        assert_eq!(debug.status, 200);
        assert_eq!(debug.body["runId"], 7);
    }

    #[test]
    fn undecodable_frames_are_skipped() {
        let log = MessageLog::default();
        handle_frame("not json", &log);
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn delivers_relayed_messages() {
        let (listener, url) = bind().await;
        let _accepted = serve_and_close(
            listener,
            vec![ControlFrame::greeting().to_json(), r#"{"text":"from relay"}"#.into()],
        );
        let log = Arc::new(MessageLog::default());
        let mut events = log.subscribe();
        let subscriber = ReconnectingSubscriber::spawn(url, Duration::from_secs(60), log.clone());

        let message = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.text, "from relay");
        assert_eq!(message.sender, SenderType::Bot);
        subscriber.shutdown().await;
    }

    #[tokio::test]
    async fn reconnects_after_close() {
        let (listener, url) = bind().await;
        let accepted = serve_and_close(listener, Vec::new());
        let subscriber =
            ReconnectingSubscriber::spawn(url, Duration::from_millis(50), Arc::new(MessageLog::default()));

        tokio::time::timeout(Duration::from_secs(5), async {
            while accepted.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert!(subscriber.state().attempts >= 3);
        subscriber.shutdown().await;
    }

    #[tokio::test]
    async fn retries_when_nothing_listens() {
        let (listener, url) = bind().await;
        drop(listener);
        let subscriber =
            ReconnectingSubscriber::spawn(url, Duration::from_millis(20), Arc::new(MessageLog::default()));
        let mut state = subscriber.watch_state();
        tokio::time::timeout(Duration::from_secs(5), async {
            while state.borrow_and_update().attempts < 3 {
                state.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        assert!(!subscriber.state().connected);
        subscriber.shutdown().await;
    }

    #[tokio::test]
    async fn stalled_handshake_is_retried() {
        let (listener, url) = bind().await;
        // Accept TCP but never answer the upgrade.
        let _server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        let subscriber =
            ReconnectingSubscriber::spawn(url, Duration::from_millis(50), Arc::new(MessageLog::default()));
        let mut state = subscriber.watch_state();
        tokio::time::timeout(Duration::from_secs(5), async {
            while state.borrow_and_update().attempts < 3 {
                state.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        assert!(!subscriber.state().connected);
        subscriber.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_reconnecting() {
        let (listener, url) = bind().await;
        let accepted = serve_and_close(listener, Vec::new());
        let subscriber =
            ReconnectingSubscriber::spawn(url, Duration::from_millis(30), Arc::new(MessageLog::default()));
        tokio::time::sleep(Duration::from_millis(100)).await;
        subscriber.shutdown().await;

        let after_shutdown = accepted.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(accepted.load(Ordering::SeqCst), after_shutdown);
    }

    #[tokio::test]
    async fn open_session_reports_connected() {
        let (listener, url) = bind().await;
        // Hold the session open.
        let _server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while ws.next().await.is_some() {}
        });
        let subscriber =
            ReconnectingSubscriber::spawn(url, Duration::from_secs(60), Arc::new(MessageLog::default()));
        let mut state = subscriber.watch_state();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !state.borrow_and_update().connected {
                state.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        subscriber.shutdown().await;
    }
}
