//! Waiting pool: the authoritative set of players currently seeking a match
//!
//! The pool is an ordered set keyed by player id and scored by enqueue time,
//! so the longest-waiting players are always taken first. The Redis-backed
//! implementation is the production store; the in-memory implementation backs
//! tests and broker-less local runs.

pub mod memory;
pub mod redis;

pub use memory::InMemoryPool;
pub use redis::RedisPool;

use crate::error::Result;
use crate::types::PlayerId;
use async_trait::async_trait;

/// Capability exposed by any waiting-pool backend
#[async_trait]
pub trait WaitingPool: Send + Sync {
    /// Add a player to the pool. Re-adding an already-waiting player
    /// refreshes their enqueue time.
    async fn add(&self, player_id: &str) -> Result<()>;

    /// Remove a player from the pool. Removing an absent player is a no-op.
    async fn remove(&self, player_id: &str) -> Result<()>;

    /// Atomically take the `required_players` longest-waiting players.
    ///
    /// Either returns exactly that many distinct players, removed from the
    /// pool in the same step, or `None` with the pool untouched. Partial
    /// matches never leave the pool.
    async fn try_form_match(&self, required_players: usize) -> Result<Option<Vec<PlayerId>>>;

    /// Number of players currently waiting
    async fn count(&self) -> Result<usize>;
}
