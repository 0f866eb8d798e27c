//! Chat client: outbound status, validation, and strict-200 send.

use std::sync::Arc;

use parking_lot::Mutex;
use relay_core::{ConnectionStatus, Message, OutboundMessage};
use reqwest::StatusCode;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::errors::ClientError;
use crate::messages::MessageLog;
use crate::validator::{OutboundValidator, ValidationOutcome};

/// Result of a send that reached the network stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// The target answered 200.
    Delivered,
    /// The target answered with another status. A notice was appended.
    Rejected {
        /// Status returned by the target.
        status: u16,
    },
    /// The request never completed. A notice was appended.
    TransportFailed,
}

/// Owns a client's connection status, outbound target and message log.
pub struct ChatClient {
    http: reqwest::Client,
    validator: OutboundValidator,
    status: watch::Sender<ConnectionStatus>,
    target: Mutex<Option<String>>,
    log: Arc<MessageLog>,
    chat_id: String,
}

impl ChatClient {
    /// Create an idle client.
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_log(config, Arc::new(MessageLog::new(config.duplicate_window)))
    }

    /// Create an idle client appending to an existing log.
    pub fn with_log(config: &ClientConfig, log: Arc<MessageLog>) -> Self {
        let http = reqwest::Client::new();
        let (status, _) = watch::channel(ConnectionStatus::Idle);
        Self {
            validator: OutboundValidator::from_config(http.clone(), config),
            http,
            status,
            target: Mutex::new(None),
            log,
            chat_id: config.chat_id.clone(),
        }
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Receive status changes.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// The message log.
    pub fn log(&self) -> &Arc<MessageLog> {
        &self.log
    }

    /// Session identifier sent with every message.
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// The validated outbound target, if any.
    pub fn target(&self) -> Option<String> {
        self.target.lock().clone()
    }

    /// Validate `url` and, on success, make it the outbound target.
    ///
    /// Moves to `CONNECTING`, then `CONNECTED` or `ERROR`, appending a notice
    /// either way. Rejected while another validation runs.
    pub async fn connect(&self, url: &str) -> Result<ValidationOutcome, ClientError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ClientError::EmptyUrl);
        }
        let entered = self.status.send_if_modified(|status| {
            if *status == ConnectionStatus::Connecting {
                false
            } else {
                *status = ConnectionStatus::Connecting;
                true
            }
        });
        if !entered {
            return Err(ClientError::ValidationInProgress);
        }

        let outcome = self.validator.validate(url).await;
        match &outcome {
            ValidationOutcome::Connected { url, .. } => {
                *self.target.lock() = Some(url.clone());
                let _ = self.status.send_replace(ConnectionStatus::Connected);
                let _ = self
                    .log
                    .notice(format!("Connected to {url} (status 200). Webhook active."));
            }
            ValidationOutcome::Failed { attempts, last_error } => {
                let _ = self.status.send_replace(ConnectionStatus::Error);
                warn!(url, attempts, error = %last_error, "outbound validation failed");
                let _ = self.log.notice(format!(
                    "Could not reach the server after {attempts} attempts. \
                     Check the URL and that the workflow accepts GET."
                ));
            }
        }
        Ok(outcome)
    }

    /// Send `text` to the outbound target.
    ///
    /// The user message is appended before the request and never removed.
    /// Only a 200 counts as delivered; anything else appends a notice and
    /// leaves the status unchanged.
    pub async fn send(&self, text: &str) -> Result<SendOutcome, ClientError> {
        let status = self.status();
        if !status.can_send() {
            return Err(ClientError::NotConnected(status));
        }
        if text.trim().is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        let Some(target) = self.target() else {
            return Err(ClientError::NotConnected(status));
        };

        let _ = self.log.push(Message::user(text));
        let body = OutboundMessage::new(text, self.chat_id.as_str());
        info!(target = target.as_str(), "sending message");

        match self.http.post(&target).json(&body).send().await {
            Ok(response) if response.status() == StatusCode::OK => Ok(SendOutcome::Delivered),
            Ok(response) => {
                let status = response.status().as_u16();
                warn!(status, "send rejected");
                let _ = self
                    .log
                    .notice(format!("Send failed: server responded with status {status}"));
                Ok(SendOutcome::Rejected { status })
            }
            Err(error) => {
                warn!(%error, "send failed");
                let _ = self
                    .log
                    .notice("Connection error while sending the message.");
                Ok(SendOutcome::TransportFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use relay_core::SenderType;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_config() -> ClientConfig {
        ClientConfig {
            validation_retry_delay: Duration::from_millis(10),
            chat_id: "chat-test".into(),
            ..ClientConfig::default()
        }
    }

    async fn connected_client(server: &MockServer, post_status: u16) -> ChatClient {
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(post_status))
            .mount(server)
            .await;
        let client = ChatClient::new(&make_config());
        let outcome = client.connect(&server.uri()).await.unwrap();
        assert!(outcome.is_connected());
        client
    }

    fn notices(client: &ChatClient) -> Vec<String> {
        client
            .log()
            .by_sender(SenderType::System)
            .into_iter()
            .map(|m| m.text)
            .collect()
    }

    // ── connect ──

    #[tokio::test]
    async fn starts_idle() {
        let client = ChatClient::new(&make_config());
        assert_eq!(client.status(), ConnectionStatus::Idle);
        assert!(client.target().is_none());
    }

    #[tokio::test]
    async fn connect_success_sets_target_and_notice() {
        let server = MockServer::start().await;
        let client = connected_client(&server, 200).await;
        assert_eq!(client.status(), ConnectionStatus::Connected);
        assert_eq!(client.target().as_deref(), Some(server.uri().as_str()));
        assert_eq!(notices(&client).len(), 1);
    }

    #[tokio::test]
    async fn connect_failure_moves_to_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;
        let client = ChatClient::new(&make_config());
        let outcome = client.connect(&server.uri()).await.unwrap();
        assert_eq!(outcome.attempts(), 3);
        assert_eq!(client.status(), ConnectionStatus::Error);
        assert!(client.target().is_none());
        assert!(notices(&client)[0].contains("3 attempts"));
    }

    #[tokio::test]
    async fn retry_after_error_reenters_connecting() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(3)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let client = ChatClient::new(&make_config());
        let mut status_rx = client.watch_status();

        let _ = client.connect(&server.uri()).await.unwrap();
        assert_eq!(client.status(), ConnectionStatus::Error);
        let _ = client.connect(&server.uri()).await.unwrap();
        assert_eq!(client.status(), ConnectionStatus::Connected);
        assert!(status_rx.has_changed().unwrap());
        assert_eq!(*status_rx.borrow_and_update(), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn empty_url_rejected() {
        let client = ChatClient::new(&make_config());
        assert_matches!(client.connect("   ").await, Err(ClientError::EmptyUrl));
        assert_eq!(client.status(), ConnectionStatus::Idle);
    }

    #[tokio::test]
    async fn concurrent_connect_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
            .mount(&server)
            .await;
        let client = ChatClient::new(&make_config());
        let uri = server.uri();
        let (first, second) = tokio::join!(client.connect(&uri), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            client.connect(&uri).await
        });
        assert!(first.unwrap().is_connected());
        assert_matches!(second, Err(ClientError::ValidationInProgress));
    }

    // ── send ──

    #[tokio::test]
    async fn send_requires_connected() {
        let client = ChatClient::new(&make_config());
        assert_matches!(
            client.send("hi").await,
            Err(ClientError::NotConnected(ConnectionStatus::Idle))
        );
        assert!(client.log().is_empty());
    }

    #[tokio::test]
    async fn send_rejects_blank_text() {
        let server = MockServer::start().await;
        let client = connected_client(&server, 200).await;
        assert_matches!(client.send("  ").await, Err(ClientError::EmptyMessage));
    }

    #[tokio::test]
    async fn send_200_is_delivered_without_notice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("content-type", "application/json"))
            .and(body_partial_json(serde_json::json!({
                "message": "hello",
                "chatId": "chat-test"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        let client = connected_client(&server, 200).await;

        let outcome = client.send("hello").await.unwrap();
        assert_eq!(outcome, SendOutcome::Delivered);
        assert_eq!(notices(&client).len(), 1);
        assert_eq!(client.log().by_sender(SenderType::User)[0].text, "hello");
    }

    #[tokio::test]
    async fn send_201_is_rejected() {
        let server = MockServer::start().await;
        let client = connected_client(&server, 201).await;
        let outcome = client.send("hello").await.unwrap();
        assert_eq!(outcome, SendOutcome::Rejected { status: 201 });
        assert_eq!(client.status(), ConnectionStatus::Connected);
        assert!(notices(&client).last().unwrap().contains("201"));
    }

    #[tokio::test]
    async fn send_404_keeps_user_message() {
        let server = MockServer::start().await;
        let client = connected_client(&server, 404).await;
        let _ = client.send("kept").await.unwrap();
        let log = client.log().snapshot();
        let user_pos = log.iter().position(|m| m.sender == SenderType::User).unwrap();
        let notice_pos = log.iter().rposition(|m| m.sender == SenderType::System).unwrap();
        assert!(user_pos < notice_pos);
        assert_eq!(client.status(), ConnectionStatus::Connected);
    }

    /// Answer a single request with a bare 200, then stop listening.
    async fn serve_one_ok() -> (String, tokio::task::JoinHandle<()>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = [0_u8; 2048];
            let _ = stream.read(&mut request).await.unwrap();
            stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await
                .unwrap();
            let _ = stream.shutdown().await;
        });
        (url, server)
    }

    #[tokio::test]
    async fn send_transport_error_appends_notice() {
        let (url, server) = serve_one_ok().await;
        let client = ChatClient::new(&make_config());
        assert!(client.connect(&url).await.unwrap().is_connected());
        // The listener is gone once the task ends.
        server.await.unwrap();

        let outcome = client.send("lost").await.unwrap();
        assert_eq!(outcome, SendOutcome::TransportFailed);
        assert_eq!(client.status(), ConnectionStatus::Connected);
        let notices = notices(&client);
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[1], "Connection error while sending the message.");
        assert_eq!(client.log().by_sender(SenderType::User)[0].text, "lost");
    }
}
