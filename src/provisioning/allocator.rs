//! Game-server allocation
//!
//! In a real deployment allocation calls into a container scheduler; the
//! simulated allocator models that with a fixed delay and a static endpoint.

use crate::error::Result;
use crate::types::{MatchId, ServerEndpoint};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// Capability for reserving a game-server endpoint for a match
#[async_trait]
pub trait Allocator: Send + Sync {
    async fn allocate(&self, match_id: MatchId) -> Result<ServerEndpoint>;
}

/// Allocator that models scheduler latency with a fixed delay
pub struct SimulatedAllocator {
    delay: Duration,
    addr: String,
    port: String,
}

impl SimulatedAllocator {
    pub fn new(delay: Duration, addr: &str, port: &str) -> Self {
        Self {
            delay,
            addr: addr.to_string(),
            port: port.to_string(),
        }
    }
}

impl Default for SimulatedAllocator {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), "localhost", "7777")
    }
}

#[async_trait]
impl Allocator for SimulatedAllocator {
    async fn allocate(&self, match_id: MatchId) -> Result<ServerEndpoint> {
        info!(match_id = %match_id, "Provisioning new game server...");

        tokio::time::sleep(self.delay).await;

        let endpoint = ServerEndpoint {
            addr: self.addr.clone(),
            port: self.port.clone(),
        };

        info!(
            match_id = %match_id,
            address = format!("{}:{}", endpoint.addr, endpoint.port),
            "Game server provisioned successfully"
        );

        Ok(endpoint)
    }
}
