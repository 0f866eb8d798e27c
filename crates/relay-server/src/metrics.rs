//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus recorder as the global metrics recorder.
///
/// Returns the handle used by `GET /metrics`. Call once per process.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from a recorder handle.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric names shared by the broker and the session loop.

/// Payloads accepted on the ingestion endpoint (counter).
pub const PAYLOADS_INGESTED_TOTAL: &str = "relay_payloads_ingested_total";
/// Payloads whose message field was unwrapped (counter).
pub const PAYLOADS_UNWRAPPED_TOTAL: &str = "relay_payloads_unwrapped_total";
/// Fan-out deliveries that failed and closed a session (counter).
pub const BROADCAST_DROPS_TOTAL: &str = "relay_broadcast_drops_total";
/// Frames currently retained for replay (gauge).
pub const HISTORY_SIZE: &str = "relay_history_size";
/// Push-channel connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Push-channel disconnections (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Open push-channel sessions (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Push-channel session lifetime in seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_from_local_recorder() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = render(&handle);
        assert!(output.is_empty() || output.contains('\n'));
    }

    #[test]
    fn metric_names_are_snake_case() {
        let names = [
            PAYLOADS_INGESTED_TOTAL,
            PAYLOADS_UNWRAPPED_TOTAL,
            BROADCAST_DROPS_TOTAL,
            HISTORY_SIZE,
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_CONNECTION_DURATION_SECONDS,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "{name} is not snake_case"
            );
        }
    }
}
