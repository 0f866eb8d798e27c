//! Bounded-retry connectivity probe against the outbound target.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::errors::ClientError;

/// Result of a validation run.
#[derive(Debug)]
pub enum ValidationOutcome {
    /// A probe answered 200.
    Connected {
        /// The validated URL, now the active outbound target.
        url: String,
        /// Probes made, including the successful one.
        attempts: u32,
    },
    /// Every probe failed.
    Failed {
        /// Probes made.
        attempts: u32,
        /// Failure of the final probe.
        last_error: ClientError,
    },
}

impl ValidationOutcome {
    /// Whether validation succeeded.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Probes made.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Connected { attempts, .. } | Self::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Issues `GET url` with `Accept: application/json` until one answers 200
/// or the attempt budget is spent.
#[derive(Clone, Debug)]
pub struct OutboundValidator {
    http: reqwest::Client,
    attempts: u32,
    retry_delay: Duration,
}

impl OutboundValidator {
    /// Create a validator with an explicit budget.
    pub fn new(http: reqwest::Client, attempts: u32, retry_delay: Duration) -> Self {
        Self {
            http,
            attempts: attempts.max(1),
            retry_delay,
        }
    }

    /// Create a validator from client configuration.
    pub fn from_config(http: reqwest::Client, config: &ClientConfig) -> Self {
        Self::new(http, config.validation_attempts, config.validation_retry_delay)
    }

    /// Probe `url`, waiting `retry_delay` between failures.
    ///
    /// Stops at the first 200. Never waits after the final failure.
    pub async fn validate(&self, url: &str) -> ValidationOutcome {
        let mut attempt = 0;
        loop {
            attempt += 1;
            info!(url, attempt, max_attempts = self.attempts, "probing outbound target");
            match self.probe(url).await {
                Ok(()) => {
                    info!(url, attempt, "outbound target validated");
                    return ValidationOutcome::Connected {
                        url: url.to_string(),
                        attempts: attempt,
                    };
                }
                Err(error) => {
                    warn!(url, attempt, %error, "probe failed");
                    if attempt >= self.attempts {
                        return ValidationOutcome::Failed {
                            attempts: attempt,
                            last_error: error,
                        };
                    }
                }
            }
            tokio::time::sleep(self.retry_delay).await;
        }
    }

    async fn probe(&self, url: &str) -> Result<(), ClientError> {
        let response = self
            .http
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        match response.status() {
            StatusCode::OK => Ok(()),
            other => Err(ClientError::UnexpectedStatus(other.as_u16())),
        }
    }
}
