//! Common types used throughout the matchmaking backend

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for players, supplied by upstream auth
pub type PlayerId = String;

/// Unique identifier for matches, minted by the formation loop
pub type MatchId = Uuid;

/// Unique identifier for registered users
pub type UserId = Uuid;

/// Event emitted when the formation loop has grouped enough players
///
/// `player_ids` preserves pool departure order: the longest-waiting player
/// comes first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchFoundEvent {
    #[serde(rename = "matchID")]
    pub match_id: MatchId,
    #[serde(rename = "playerIDs")]
    pub player_ids: Vec<PlayerId>,
}

/// Event emitted once a game server has been allocated for a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerReadyEvent {
    #[serde(rename = "matchID")]
    pub match_id: MatchId,
    #[serde(rename = "playerIDs")]
    pub player_ids: Vec<PlayerId>,
    #[serde(rename = "serverAddr")]
    pub server_addr: String,
    #[serde(rename = "serverPort")]
    pub server_port: String,
}

/// Endpoint of an allocated game server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    pub addr: String,
    pub port: String,
}

/// Frames pushed to clients over their WebSocket session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "MATCH_FOUND")]
    MatchFound {
        #[serde(rename = "matchID")]
        match_id: MatchId,
        #[serde(rename = "serverAddr")]
        server_addr: String,
        #[serde(rename = "serverPort")]
        server_port: String,
    },
}

/// Request body for POST /api/v1/auth/register
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Response body for a successful registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    #[serde(rename = "userId")]
    pub user_id: UserId,
}

/// Request body for POST /api/v1/auth/login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Response body for a successful login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(rename = "sessionToken")]
    pub session_token: String,
}

/// Player profile record served by GET /api/v1/profiles/{userID}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    pub username: String,
    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}
