//! `RelayServer`: Axum HTTP + push-channel server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use relay_core::ConnectionId;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::broker::RelayBroker;
use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{HealthResponse, health_check};
use crate::ingest::webhook_receiver;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::run_ws_session;

/// Path of the ingestion endpoint.
pub const WEBHOOK_PATH: &str = "/api/webhook-receiver";

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Handle to the broker task.
    pub broker: RelayBroker,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// Stop signal for sessions.
    pub shutdown: Arc<ShutdownCoordinator>,
}

/// The relay server.
pub struct RelayServer {
    config: Arc<ServerConfig>,
    broker: RelayBroker,
    broker_task: Option<JoinHandle<()>>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
}

impl RelayServer {
    /// Create a server and spawn its broker. Must run inside a Tokio runtime.
    pub fn new(config: ServerConfig, metrics: Option<PrometheusHandle>) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let (broker, broker_task) = RelayBroker::spawn(&config, shutdown.token());
        Self {
            config: Arc::new(config),
            broker,
            broker_task: Some(broker_task),
            shutdown,
            metrics,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            broker: self.broker.clone(),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
            shutdown: self.shutdown.clone(),
        };

        Router::new()
            .route("/", get(root_handler))
            .route(WEBHOOK_PATH, post(webhook_receiver))
            .route("/metrics", get(metrics_handler))
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind and serve until shutdown.
    ///
    /// Returns the bound address (useful with port 0) and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local = listener.local_addr()?;
        info!(%local, "relay listening");

        let app = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(error) = served {
                error!(%error, "relay server stopped with error");
            }
        });
        Ok((local, handle))
    }

    /// Broker handle.
    pub fn broker(&self) -> &RelayBroker {
        &self.broker
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Take the broker task handle for graceful shutdown. Yields it once.
    pub fn take_broker_task(&mut self) -> Option<JoinHandle<()>> {
        self.broker_task.take()
    }
}

/// `GET /`: push-channel upgrade when requested, health probe otherwise.
async fn root_handler(
    State(state): State<AppState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match upgrade {
        Ok(ws) => {
            let AppState {
                broker,
                config,
                shutdown,
                ..
            } = state;
            ws.max_message_size(config.max_message_size)
                .on_upgrade(move |socket| {
                    run_ws_session(socket, ConnectionId::new(), broker, config, shutdown.token())
                })
        }
        Err(_) => Json(health(&state.broker).await).into_response(),
    }
}

async fn health(broker: &RelayBroker) -> HealthResponse {
    // A stopped broker reports an empty relay.
    health_check(broker.stats().await.unwrap_or_default())
}

/// `GET /metrics`: Prometheus text exposition.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
