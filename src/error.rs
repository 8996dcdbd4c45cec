//! Error types for the matchmaking backend
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific matchmaking scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("Event bus error: {message}")]
    BusError { message: String },

    #[error("Pool store error: {message}")]
    PoolStoreError { message: String },

    #[error("Duplicate session for player: {player_id}")]
    DuplicateSession { player_id: String },

    #[error("No live session for player: {player_id}")]
    UnknownPlayer { player_id: String },

    #[error("Match {match_id} removed from pool but publish failed: {message}")]
    PublishAfterPopFailure { match_id: String, message: String },

    #[error("Provisioning failed for match {match_id}: {message}")]
    ProvisioningFailure { match_id: String, message: String },

    #[error("Invalid event payload: {reason}")]
    InvalidEvent { reason: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}
