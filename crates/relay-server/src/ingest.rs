//! `POST /api/webhook-receiver`: ingestion from the workflow engine.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::server::AppState;

/// Characters of the raw body included in ingestion logs.
pub const LOG_PREVIEW_CHARS: usize = 150;

/// Accept a payload and hand it to the broker.
///
/// Always answers `200 OK`. Relay-internal conditions (no subscribers,
/// malformed embedded JSON, broker shutting down) are logged, never surfaced.
pub async fn webhook_receiver(State(state): State<AppState>, body: Bytes) -> (StatusCode, &'static str) {
    let payload = decode_body(&body);
    info!(bytes = body.len(), preview = %preview(&payload), "webhook received");

    match state.broker.publish(payload).await {
        Ok(report) => debug!(
            recipients = report.recipients,
            dropped = report.dropped,
            buffered = report.buffered,
            "webhook relayed"
        ),
        Err(error) => error!(%error, "webhook payload not relayed"),
    }
    (StatusCode::OK, "OK")
}

/// Parse an ingestion body.
///
/// An empty body becomes `{}`. A body that is not JSON is relayed as a
/// string payload rather than rejected.
pub fn decode_body(body: &[u8]) -> Value {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Value::Object(serde_json::Map::new());
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

/// First [`LOG_PREVIEW_CHARS`] characters of the serialized payload.
pub fn preview(payload: &Value) -> String {
    let text = payload.to_string();
    match text.char_indices().nth(LOG_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text,
    }
}
