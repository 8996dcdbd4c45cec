//! Client session gateway
//!
//! Accepts WebSocket connections identified by player id, keeps the waiting
//! pool in sync with session lifecycles, and fans ServerReadyEvents out to
//! the matched players' live sessions. Also exposes the HTTP surface that
//! fronts the credential issuer and the profile store.

pub mod clients;
pub mod http;
pub mod notifier;
pub mod registry;
pub mod socket;

pub use clients::{CredentialIssuer, InMemoryAccounts, ProfileStore};
pub use http::GatewayServer;
pub use notifier::MatchNotifier;
pub use registry::SessionRegistry;

use crate::metrics::MetricsCollector;
use crate::pool::WaitingPool;
use std::sync::Arc;
use std::time::Duration;

/// Shared state threaded through the gateway router
#[derive(Clone)]
pub struct GatewayState {
    pub registry: Arc<SessionRegistry>,
    pub pool: Arc<dyn WaitingPool>,
    pub issuer: Arc<dyn CredentialIssuer>,
    pub profiles: Arc<dyn ProfileStore>,
    pub metrics: Arc<MetricsCollector>,
    /// Socket read deadline, renewed on any inbound frame
    pub read_deadline: Duration,
    /// Per-call budget for outbound requests to upstream collaborators
    pub upstream_timeout: Duration,
}
