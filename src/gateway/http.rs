//! Gateway HTTP surface
//!
//! Routes registration, login, and profile reads to the upstream
//! collaborators and hosts the matchmaking WebSocket upgrade. Every outbound
//! collaborator call is bounded by the configured per-call timeout.

use crate::gateway::clients::{AuthError, ProfileError};
use crate::gateway::socket::ws_handler;
use crate::gateway::GatewayState;
use crate::types::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

/// Structured JSON error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// POST /api/v1/auth/register
async fn register_handler(
    State(state): State<GatewayState>,
    Json(request): Json<RegisterRequest>,
) -> axum::response::Response {
    if request.email.is_empty() || request.username.is_empty() || request.password.len() < 8 {
        return error_response(
            StatusCode::BAD_REQUEST,
            "email, username, and password (min 8 chars) are required",
        );
    }

    let result =
        tokio::time::timeout(state.upstream_timeout, state.issuer.register(request)).await;

    match result {
        Ok(Ok(user_id)) => {
            info!(user_id = %user_id, "New user registered successfully");
            (StatusCode::CREATED, Json(RegisterResponse { user_id })).into_response()
        }
        Ok(Err(AuthError::Duplicate)) => {
            error_response(StatusCode::CONFLICT, "account already exists")
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Registration failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Registration failed")
        }
        Err(_) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "Registration timed out"),
    }
}

/// POST /api/v1/auth/login
async fn login_handler(
    State(state): State<GatewayState>,
    Json(request): Json<LoginRequest>,
) -> axum::response::Response {
    let result = tokio::time::timeout(
        state.upstream_timeout,
        state.issuer.login(&request.email, &request.password),
    )
    .await;

    match result {
        Ok(Ok(session_token)) => {
            (StatusCode::OK, Json(LoginResponse { session_token })).into_response()
        }
        Ok(Err(AuthError::InvalidCredentials)) => {
            error_response(StatusCode::UNAUTHORIZED, "invalid credentials")
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Login failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Login failed")
        }
        Err(_) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "Login timed out"),
    }
}

/// GET /api/v1/profiles/{userID}
async fn profile_handler(
    State(state): State<GatewayState>,
    Path(user_id): Path<String>,
) -> axum::response::Response {
    let Ok(user_id) = Uuid::parse_str(&user_id) else {
        return error_response(StatusCode::BAD_REQUEST, "invalid user id");
    };

    let result = tokio::time::timeout(state.upstream_timeout, state.profiles.get(user_id)).await;

    match result {
        Ok(Ok(Some(profile))) => (StatusCode::OK, Json(profile)).into_response(),
        Ok(Ok(None)) => error_response(StatusCode::NOT_FOUND, "profile not found"),
        Ok(Err(ProfileError::Unavailable(message))) => {
            warn!(error = %message, "Profile lookup failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Profile lookup failed")
        }
        Err(_) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "Profile lookup timed out"),
    }
}

/// Build the gateway router with all API routes
pub fn create_router(state: GatewayState) -> Router {
    Router::new()
        .route("/api/v1/auth/register", post(register_handler))
        .route("/api/v1/auth/login", post(login_handler))
        .route("/api/v1/profiles/:user_id", get(profile_handler))
        .route("/api/v1/matchmaking/find", get(ws_handler))
        .with_state(state)
}

/// Gateway HTTP server configuration
#[derive(Debug, Clone)]
pub struct GatewayServerConfig {
    pub port: u16,
    pub host: String,
}

impl Default for GatewayServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// HTTP/WebSocket server hosting the gateway surface
pub struct GatewayServer {
    config: GatewayServerConfig,
    state: GatewayState,
    shutdown_tx: broadcast::Sender<()>,
}

impl GatewayServer {
    pub fn new(config: GatewayServerConfig, state: GatewayState) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state,
            shutdown_tx,
        }
    }

    /// Bind the listener. Split from `serve` so a bind failure surfaces at
    /// startup instead of inside a background task.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid gateway server address")?;

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind gateway listener on {}", addr))?;

        info!("Gateway listening on http://{}", addr);
        Ok(listener)
    }

    /// Serve connections until the shutdown signal fires; in-flight writes
    /// drain before the server returns.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let app = create_router(self.state.clone());
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Gateway shutdown signal received");
            })
            .await?;

        info!("Gateway server stopped");
        Ok(())
    }

    /// Stop accepting new connections and begin draining
    pub fn stop(&self) {
        info!("Stopping gateway server...");
        let _ = self.shutdown_tx.send(());
    }
}
