//! WebSocket session handling
//!
//! One task per session owns the socket exclusively: it reads client frames
//! (only close is meaningful; anything else just proves liveness), drains the
//! session's notification channel, watches the eviction signal, and enforces
//! the read deadline. Termination always funnels into one cleanup path that
//! retracts the registry entry and removes the player from the pool.

use crate::gateway::http::ErrorResponse;
use crate::gateway::GatewayState;
use crate::types::{ClientFrame, PlayerId};
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Query parameters accepted by the matchmaking find endpoint
#[derive(Debug, Deserialize)]
pub struct FindQuery {
    /// Trusted player id supplied by upstream middleware
    #[serde(rename = "playerID")]
    player_id: Option<String>,
    /// Session token resolved through the credential issuer
    token: Option<String>,
}

/// GET /api/v1/matchmaking/find - upgrade to a matchmaking session
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    Query(query): Query<FindQuery>,
    headers: HeaderMap,
) -> Response {
    let player_id = match resolve_player_id(&state, &query, &headers).await {
        Ok(player_id) => player_id,
        Err(response) => return response,
    };

    ws.on_upgrade(move |socket| handle_session(socket, state, player_id))
}

/// Determine the player identity for the upgrade request.
///
/// The trusted path takes `playerID` verbatim; otherwise a bearer token
/// (Authorization header or `token` query parameter) is resolved through
/// the credential issuer.
async fn resolve_player_id(
    state: &GatewayState,
    query: &FindQuery,
    headers: &HeaderMap,
) -> Result<PlayerId, Response> {
    if let Some(player_id) = &query.player_id {
        if !player_id.is_empty() {
            return Ok(player_id.clone());
        }
    }

    let token = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.to_string())
        .or_else(|| query.token.clone());

    let Some(token) = token else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Player ID is required".to_string(),
            }),
        )
            .into_response());
    };

    match tokio::time::timeout(state.upstream_timeout, state.issuer.resolve_token(&token)).await {
        Ok(Ok(player_id)) => Ok(player_id),
        Ok(Err(e)) => {
            warn!(error = %e, "Session token rejected");
            Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid session token".to_string(),
                }),
            )
                .into_response())
        }
        Err(_) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "Credential issuer unavailable".to_string(),
            }),
        )
            .into_response()),
    }
}

/// Drive one WebSocket session from registration to cleanup
pub async fn handle_session(mut socket: WebSocket, state: GatewayState, player_id: PlayerId) {
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel();
    let evict = Arc::new(Notify::new());
    let token = state.registry.register(&player_id, frame_tx, evict.clone());

    state.metrics.gateway().sessions_opened_total.inc();
    state
        .metrics
        .gateway()
        .sessions_active
        .set(state.registry.len() as i64);

    // The session only counts as waiting once the pool insert lands; a pool
    // failure rejects the session outright.
    if let Err(e) = state.pool.add(&player_id).await {
        error!(player_id = %player_id, error = %e, "Failed to add player to pool");
        state.metrics.gateway().pool_errors_total.inc();

        state.registry.remove_if_owner(&player_id, token);
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: close_code::ERROR,
                reason: "matchmaking unavailable".into(),
            })))
            .await;

        state.metrics.gateway().sessions_closed_total.inc();
        state
            .metrics
            .gateway()
            .sessions_active
            .set(state.registry.len() as i64);
        return;
    }

    info!(player_id = %player_id, "Client connected and waiting for match");

    let close_frame =
        run_session_loop(&mut socket, &mut frame_rx, &evict, state.read_deadline, &player_id).await;

    // Cleanup path; runs exactly once per session regardless of cause.
    info!(player_id = %player_id, "Closing WebSocket connection and cleaning up");

    if let Some(frame) = close_frame {
        let _ = socket.send(Message::Close(Some(frame))).await;
    }

    if state.registry.remove_if_owner(&player_id, token) {
        // Only the registry owner clears the pool entry; a replaced session
        // must not remove the waiting entry its successor just created.
        if let Err(e) = state.pool.remove(&player_id).await {
            state.metrics.gateway().pool_errors_total.inc();
            warn!(player_id = %player_id, error = %e, "Best-effort pool cleanup failed");
        }
    }

    state.metrics.gateway().sessions_closed_total.inc();
    state
        .metrics
        .gateway()
        .sessions_active
        .set(state.registry.len() as i64);
}

/// Session select loop. Returns the close frame to send, if any.
async fn run_session_loop(
    socket: &mut WebSocket,
    frame_rx: &mut mpsc::UnboundedReceiver<ClientFrame>,
    evict: &Notify,
    read_deadline: Duration,
    player_id: &str,
) -> Option<CloseFrame<'static>> {
    let mut deadline = Instant::now() + read_deadline;

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) => {
                        info!(player_id, "Client closed the session");
                        return None;
                    }
                    Some(Ok(_)) => {
                        // Any inbound frame, keepalives included, renews the
                        // read deadline. Payloads are otherwise ignored.
                        deadline = Instant::now() + read_deadline;
                    }
                    Some(Err(e)) => {
                        warn!(player_id, error = %e, "WebSocket connection closed unexpectedly");
                        return None;
                    }
                    None => {
                        info!(player_id, "WebSocket stream ended");
                        return None;
                    }
                }
            }

            frame = frame_rx.recv() => {
                match frame {
                    Some(frame) => {
                        if !forward_frame(socket, frame, player_id).await {
                            return None;
                        }
                    }
                    // The registry entry is gone; nothing can reach this
                    // session anymore.
                    None => return None,
                }
            }

            _ = evict.notified() => {
                info!(player_id, "Session evicted");
                return Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "session replaced".into(),
                });
            }

            _ = tokio::time::sleep_until(deadline) => {
                warn!(player_id, "Read deadline exceeded; terminating session");
                return Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "read deadline exceeded".into(),
                });
            }
        }
    }
}

/// Serialize and write one notification frame. Returns false when the
/// session is broken and the loop should end; the failure is logged and
/// never retried.
async fn forward_frame(socket: &mut WebSocket, frame: ClientFrame, player_id: &str) -> bool {
    let text = match serde_json::to_string(&frame) {
        Ok(text) => text,
        Err(e) => {
            error!(player_id, error = %e, "Failed to serialize notification frame");
            return true;
        }
    };

    match socket.send(Message::Text(text)).await {
        Ok(()) => {
            info!(player_id, "Sent MATCH_FOUND notification");
            true
        }
        Err(e) => {
            warn!(player_id, error = %e, "Failed to send notification to client");
            false
        }
    }
}
