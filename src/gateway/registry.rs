//! Session registry
//!
//! Concurrent map from player id to the live session's write channel. The
//! session task owns its socket exclusively; everything else reaches the
//! client by queueing frames through the channel, which also serializes
//! writes per session.
//!
//! Each registration carries an ownership token. Cleanup and eviction are
//! token-guarded so a stale session can never tear down the newer session
//! that replaced it.

use crate::types::{ClientFrame, PlayerId};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info};

/// Handle to one live session, held in the registry
pub struct SessionHandle {
    token: u64,
    sender: mpsc::UnboundedSender<ClientFrame>,
    evict: Arc<Notify>,
}

/// Concurrent registry of live sessions, one per player id
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<PlayerId, SessionHandle>,
    next_token: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session for a player and return its ownership token.
    ///
    /// A previous session under the same player id is replaced: its eviction
    /// signal fires and its task runs the normal termination path, but the
    /// token guard keeps it from touching this registration.
    pub fn register(
        &self,
        player_id: &str,
        sender: mpsc::UnboundedSender<ClientFrame>,
        evict: Arc<Notify>,
    ) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let handle = SessionHandle {
            token,
            sender,
            evict,
        };

        if let Some(old) = self.sessions.insert(player_id.to_string(), handle) {
            info!(player_id, "Replacing existing session for player");
            old.evict.notify_one();
        }

        token
    }

    /// Remove the player's entry if the given token still owns it.
    /// Returns true when this call removed the entry.
    pub fn remove_if_owner(&self, player_id: &str, token: u64) -> bool {
        self.sessions
            .remove_if(player_id, |_, handle| handle.token == token)
            .is_some()
    }

    /// Write channel of the player's live session, if any
    pub fn sender_for(&self, player_id: &str) -> Option<mpsc::UnboundedSender<ClientFrame>> {
        self.sessions
            .get(player_id)
            .map(|handle| handle.sender.clone())
    }

    /// Whether the player currently has a live session
    pub fn contains(&self, player_id: &str) -> bool {
        self.sessions.contains_key(player_id)
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Fire the eviction signal for every session (shutdown path)
    pub fn evict_all(&self) {
        let count = self.sessions.len();
        for entry in self.sessions.iter() {
            entry.value().evict.notify_one();
        }
        debug!(count, "Evicted all sessions");
    }
}
