//! # relay-server
//!
//! Axum HTTP + `WebSocket` relay between a webhook-emitting workflow engine
//! and live chat clients.
//!
//! - `POST /api/webhook-receiver`: ingestion, always answers `200 OK`
//! - `GET /`: health probe, or push-channel upgrade when the request asks for one
//! - `GET /metrics`: Prometheus text exposition
//! - A single broker task owns the history buffer and the fan-out set
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod broker;
pub mod config;
pub mod errors;
pub mod health;
pub mod history;
pub mod ingest;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use broker::{BrokerStats, PublishReport, RelayBroker};
pub use config::ServerConfig;
pub use errors::{BrokerError, ServerError};
pub use server::RelayServer;
