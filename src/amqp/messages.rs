//! Event serialization and validation
//!
//! Events travel as bare UTF-8 JSON payloads; the match id rides in the
//! AMQP `message_id` property so consumers get per-key affinity without
//! opening the payload.

use crate::error::{MatchmakingError, Result};
use crate::types::{MatchFoundEvent, ServerReadyEvent};

/// Serialization helpers for bus events
pub struct EventCodec;

impl EventCodec {
    /// Serialize any bus event to JSON bytes
    pub fn encode<T: serde::Serialize>(event: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(event).map_err(|e| {
            MatchmakingError::InternalError {
                message: format!("Failed to serialize event: {}", e),
            }
            .into()
        })
    }

    /// Deserialize a bus event from JSON bytes
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| {
            MatchmakingError::InvalidEvent {
                reason: format!("Failed to deserialize event: {}", e),
            }
            .into()
        })
    }

    /// Validate a match-found event before it is published or processed
    pub fn validate_match_found(event: &MatchFoundEvent) -> Result<()> {
        if event.player_ids.is_empty() {
            return Err(MatchmakingError::InvalidEvent {
                reason: "Match has no players".to_string(),
            }
            .into());
        }

        if event.player_ids.iter().any(|id| id.is_empty()) {
            return Err(MatchmakingError::InvalidEvent {
                reason: "Match contains an empty player id".to_string(),
            }
            .into());
        }

        let mut seen = std::collections::HashSet::new();
        for id in &event.player_ids {
            if !seen.insert(id) {
                return Err(MatchmakingError::InvalidEvent {
                    reason: format!("Duplicate player id in match: {}", id),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Validate a server-ready event
    pub fn validate_server_ready(event: &ServerReadyEvent) -> Result<()> {
        if event.server_addr.is_empty() || event.server_port.is_empty() {
            return Err(MatchmakingError::InvalidEvent {
                reason: "Server endpoint is incomplete".to_string(),
            }
            .into());
        }

        Ok(())
    }
}
