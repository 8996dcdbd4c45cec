//! Diagnostics HTTP server: health checks, Prometheus metrics, pipeline status
//!
//! The `/status` endpoint is the observability surface for the provisioning
//! listener: it reports the number of in-flight allocation tasks alongside
//! session and pool gauges.

use crate::metrics::collector::MetricsCollector;
use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Diagnostics server configuration
#[derive(Debug, Clone)]
pub struct HealthServerConfig {
    /// Port to bind the diagnostics server to
    pub port: u16,
    /// Host to bind to (typically "0.0.0.0" for all interfaces)
    pub host: String,
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            port: 9100,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Point-in-time view of the pipeline, served by `/status`
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub healthy: bool,
    pub in_flight_allocations: i64,
    pub sessions_active: i64,
    pub players_waiting: Option<usize>,
}

/// Implemented by whatever owns the live pipeline state
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn snapshot(&self) -> StatusSnapshot;
}

/// Shared state for the diagnostics server
#[derive(Clone)]
pub struct HealthServerState {
    pub metrics_collector: Arc<MetricsCollector>,
    pub status_source: Option<Arc<dyn StatusSource>>,
}

/// Diagnostics server that provides HTTP endpoints for monitoring
pub struct HealthServer {
    config: HealthServerConfig,
    state: HealthServerState,
    shutdown_tx: broadcast::Sender<()>,
}

impl HealthServer {
    /// Create a new diagnostics server
    pub fn new(config: HealthServerConfig, metrics_collector: Arc<MetricsCollector>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state: HealthServerState {
                metrics_collector,
                status_source: None,
            },
            shutdown_tx,
        }
    }

    /// Attach the live pipeline state for `/status` and readiness checks
    pub fn with_status_source(mut self, source: Arc<dyn StatusSource>) -> Self {
        self.state.status_source = Some(source);
        self
    }

    /// Start the diagnostics server
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid diagnostics server address")?;

        let app = self.create_router();
        let listener = TcpListener::bind(addr).await?;

        info!("Diagnostics server listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Diagnostics server shutdown signal received");
            })
            .await?;

        info!("Diagnostics server stopped");
        Ok(())
    }

    /// Create the Axum router with all diagnostics endpoints
    fn create_router(&self) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/alive", get(alive_handler))
            .route("/ready", get(ready_handler))
            .route("/metrics", get(metrics_handler))
            .route("/status", get(status_handler))
            .with_state(self.state.clone())
    }

    /// Stop the diagnostics server
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping diagnostics server...");

        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to diagnostics server: {}", e);
        }

        Ok(())
    }
}

/// Root endpoint handler - shows service information
async fn root_handler() -> impl IntoResponse {
    let info = json!({
        "service": "arena-gate",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "/health",
            "/alive",
            "/ready",
            "/metrics",
            "/status"
        ]
    });

    Json(info)
}

/// Lightweight health check endpoint handler
async fn health_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    debug!("Health check requested");

    match &state.status_source {
        Some(source) => {
            let snapshot = source.snapshot().await;
            let (code, status) = if snapshot.healthy {
                (StatusCode::OK, "healthy")
            } else {
                (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
            };

            (
                code,
                Json(json!({
                    "status": status,
                    "service": "arena-gate",
                    "version": env!("CARGO_PKG_VERSION")
                })),
            )
        }
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "service": "arena-gate",
                "version": env!("CARGO_PKG_VERSION"),
                "error": "Service not initialized"
            })),
        ),
    }
}

/// Liveness check endpoint handler
async fn alive_handler() -> impl IntoResponse {
    (StatusCode::OK, "Alive")
}

/// Readiness check endpoint handler
async fn ready_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    debug!("Readiness check requested");

    match &state.status_source {
        Some(source) => {
            if source.snapshot().await.healthy {
                (StatusCode::OK, "Ready")
            } else {
                (StatusCode::SERVICE_UNAVAILABLE, "Not ready")
            }
        }
        None => (StatusCode::SERVICE_UNAVAILABLE, "Service not initialized"),
    }
}

/// Prometheus metrics endpoint handler
async fn metrics_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    debug!("Metrics endpoint requested");

    let registry = state.metrics_collector.registry();
    let metric_families = registry.gather();
    let encoder = TextEncoder::new();

    match encoder.encode_to_string(&metric_families) {
        Ok(metrics_output) => Response::builder()
            .status(StatusCode::OK)
            .header("content-type", encoder.format_type())
            .body(metrics_output)
            .unwrap_or_else(|_| Response::new(String::new())),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);

            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body("Failed to encode metrics".to_string())
                .unwrap_or_else(|_| Response::new(String::new()))
        }
    }
}

/// Pipeline status endpoint handler: in-flight allocations and session load
async fn status_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    debug!("Status endpoint requested");

    match &state.status_source {
        Some(source) => {
            let snapshot = source.snapshot().await;
            let status = json!({
                "status": if snapshot.healthy { "OK" } else { "DEGRADED" },
                "inFlightAllocations": snapshot.in_flight_allocations,
                "sessionsActive": snapshot.sessions_active,
                "playersWaiting": snapshot.players_waiting,
                "timestamp": chrono::Utc::now()
            });

            (StatusCode::OK, Json(status))
        }
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "UNAVAILABLE",
                "error": "Service not initialized",
                "timestamp": chrono::Utc::now()
            })),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt; // for oneshot

    struct FixedStatus(StatusSnapshot);

    #[async_trait]
    impl StatusSource for FixedStatus {
        async fn snapshot(&self) -> StatusSnapshot {
            self.0.clone()
        }
    }

    fn test_server() -> HealthServer {
        let collector = Arc::new(MetricsCollector::new().expect("Failed to create collector"));
        HealthServer::new(HealthServerConfig::default(), collector)
    }

    #[tokio::test]
    async fn test_root_endpoint() {
        let app = test_server().create_router();

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let collector = Arc::new(MetricsCollector::new().expect("Failed to create collector"));
        collector.pipeline().matches_formed_total.inc();

        let server = HealthServer::new(HealthServerConfig::default(), collector);
        let app = server.create_router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().contains("text/plain"));
    }

    #[tokio::test]
    async fn test_status_without_source_is_unavailable() {
        let app = test_server().create_router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_status_reports_in_flight_allocations() {
        let server = test_server().with_status_source(Arc::new(FixedStatus(StatusSnapshot {
            healthy: true,
            in_flight_allocations: 4,
            sessions_active: 12,
            players_waiting: Some(3),
        })));
        let app = server.create_router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["inFlightAllocations"], 4);
        assert_eq!(value["sessionsActive"], 12);
        assert_eq!(value["status"], "OK");
    }

    #[tokio::test]
    async fn test_ready_tracks_health() {
        let server = test_server().with_status_source(Arc::new(FixedStatus(StatusSnapshot {
            healthy: false,
            in_flight_allocations: 0,
            sessions_active: 0,
            players_waiting: None,
        })));
        let app = server.create_router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/ready")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_404_handling() {
        let app = test_server().create_router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/nonexistent")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
