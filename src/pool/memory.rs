//! In-memory waiting pool
//!
//! Implements the same contract as the Redis pool against a mutex-guarded
//! ordered map. Backs unit and property tests, and local runs without a
//! Redis instance. Entries are ordered by `(score, player_id)` so ties at
//! one-second resolution break lexicographically, matching the sorted-set
//! semantics of the production store.

use crate::error::Result;
use crate::pool::WaitingPool;
use crate::types::PlayerId;
use crate::utils::unix_seconds;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct PoolInner {
    ordered: BTreeSet<(u64, PlayerId)>,
    scores: HashMap<PlayerId, u64>,
}

/// Waiting pool held entirely in process memory
#[derive(Debug, Default)]
pub struct InMemoryPool {
    inner: Mutex<PoolInner>,
}

impl InMemoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a player with an explicit score instead of the wall clock.
    /// Lets tests pin enqueue order without sleeping across second
    /// boundaries.
    pub fn add_with_score(&self, player_id: &str, score: u64) {
        let mut inner = self.inner.lock().expect("pool lock poisoned");
        if let Some(old) = inner.scores.insert(player_id.to_string(), score) {
            inner.ordered.remove(&(old, player_id.to_string()));
        }
        inner.ordered.insert((score, player_id.to_string()));
    }

    /// Whether the given player is currently waiting
    pub fn contains(&self, player_id: &str) -> bool {
        let inner = self.inner.lock().expect("pool lock poisoned");
        inner.scores.contains_key(player_id)
    }
}

#[async_trait]
impl WaitingPool for InMemoryPool {
    async fn add(&self, player_id: &str) -> Result<()> {
        self.add_with_score(player_id, unix_seconds());
        Ok(())
    }

    async fn remove(&self, player_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().expect("pool lock poisoned");
        if let Some(score) = inner.scores.remove(player_id) {
            inner.ordered.remove(&(score, player_id.to_string()));
        }
        Ok(())
    }

    async fn try_form_match(&self, required_players: usize) -> Result<Option<Vec<PlayerId>>> {
        let mut inner = self.inner.lock().expect("pool lock poisoned");
        if inner.ordered.len() < required_players {
            return Ok(None);
        }

        let taken: Vec<(u64, PlayerId)> = inner
            .ordered
            .iter()
            .take(required_players)
            .cloned()
            .collect();

        for entry in &taken {
            inner.ordered.remove(entry);
            inner.scores.remove(&entry.1);
        }

        Ok(Some(taken.into_iter().map(|(_, id)| id).collect()))
    }

    async fn count(&self) -> Result<usize> {
        let inner = self.inner.lock().expect("pool lock poisoned");
        Ok(inner.ordered.len())
    }
}
