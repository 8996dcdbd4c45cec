//! Utility functions for the matchmaking backend

use crate::types::MatchId;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Mint a new unique match ID
pub fn generate_match_id() -> MatchId {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Current wall-clock time as Unix seconds, used as the pool fairness score
pub fn unix_seconds() -> u64 {
    Utc::now().timestamp().max(0) as u64
}
