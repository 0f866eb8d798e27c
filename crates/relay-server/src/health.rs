//! Health probe body served on `GET /`.

use serde::Serialize;

use crate::broker::BrokerStats;

/// Health probe response.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"active"` while the relay runs.
    pub status: &'static str,
    /// Open push-channel sessions.
    pub clients: usize,
    /// Frames held in the history buffer.
    pub buffer_size: usize,
}

/// Build a health response from broker counters.
pub fn health_check(stats: BrokerStats) -> HealthResponse {
    HealthResponse {
        status: "active",
        clients: stats.clients,
        buffer_size: stats.buffer_size,
    }
}
