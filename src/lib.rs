//! Arena Gate - Matchmaking backend for competitive multiplayer games
//!
//! This crate provides the match-formation and server-provisioning pipeline:
//! a Redis-backed waiting pool, a periodic formation loop, an AMQP-driven
//! provisioning listener, and the WebSocket session gateway that delivers
//! match notifications to live client sessions.

pub mod amqp;
pub mod config;
pub mod error;
pub mod gateway;
pub mod matchmaking;
pub mod metrics;
pub mod pool;
pub mod provisioning;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{MatchmakingError, Result};
pub use types::*;

// Re-export key components
pub use amqp::publisher::EventPublisher;
pub use pool::{InMemoryPool, RedisPool, WaitingPool};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
