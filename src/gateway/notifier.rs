//! Match notification fan-out
//!
//! Subscribes to ServerReadyEvents and pushes a MATCH_FOUND frame to each
//! matched player's live session. Players without a session here may have
//! disconnected mid-wait or be connected to another gateway instance; both
//! are logged and skipped. Delivery is idempotent per match id: a redelivered
//! event re-sends the same frame and clients collapse duplicates by key.

use crate::amqp::consumer::EventHandler;
use crate::error::Result;
use crate::gateway::registry::SessionRegistry;
use crate::metrics::MetricsCollector;
use crate::types::{ClientFrame, ServerReadyEvent};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Dispatches ready events to live sessions
pub struct MatchNotifier {
    registry: Arc<SessionRegistry>,
    metrics: Arc<MetricsCollector>,
}

impl MatchNotifier {
    pub fn new(registry: Arc<SessionRegistry>, metrics: Arc<MetricsCollector>) -> Self {
        Self { registry, metrics }
    }
}

#[async_trait]
impl EventHandler<ServerReadyEvent> for MatchNotifier {
    async fn handle(&self, event: ServerReadyEvent) -> Result<()> {
        info!(
            match_id = %event.match_id,
            players = ?event.player_ids,
            "Received server-ready event"
        );

        for player_id in &event.player_ids {
            let Some(sender) = self.registry.sender_for(player_id) else {
                self.metrics
                    .gateway()
                    .notifications_total
                    .with_label_values(&["offline"])
                    .inc();
                warn!(
                    player_id,
                    match_id = %event.match_id,
                    "No live session for matched player"
                );
                continue;
            };

            let frame = ClientFrame::MatchFound {
                match_id: event.match_id,
                server_addr: event.server_addr.clone(),
                server_port: event.server_port.clone(),
            };

            // The session task owns the socket; queueing through its channel
            // keeps per-session writes serialized and in dispatch order.
            match sender.send(frame) {
                Ok(()) => {
                    self.metrics
                        .gateway()
                        .notifications_total
                        .with_label_values(&["sent"])
                        .inc();
                }
                Err(_) => {
                    // The session is already tearing down; cleanup will fire.
                    self.metrics
                        .gateway()
                        .notifications_total
                        .with_label_values(&["failed"])
                        .inc();
                    warn!(
                        player_id,
                        match_id = %event.match_id,
                        "Session channel closed before notification"
                    );
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::generate_match_id;
    use tokio::sync::{mpsc, Notify};

    fn ready_event(players: &[&str]) -> ServerReadyEvent {
        ServerReadyEvent {
            match_id: generate_match_id(),
            player_ids: players.iter().map(|p| p.to_string()).collect(),
            server_addr: "localhost".to_string(),
            server_port: "7777".to_string(),
        }
    }

    fn notifier_with_registry() -> (MatchNotifier, Arc<SessionRegistry>) {
        let registry = Arc::new(SessionRegistry::new());
        let notifier = MatchNotifier::new(
            registry.clone(),
            Arc::new(MetricsCollector::new().unwrap()),
        );
        (notifier, registry)
    }

    #[tokio::test]
    async fn test_notifies_every_live_session() {
        let (notifier, registry) = notifier_with_registry();

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        registry.register("A", tx_a, Arc::new(Notify::new()));
        registry.register("B", tx_b, Arc::new(Notify::new()));

        let event = ready_event(&["A", "B"]);
        notifier.handle(event.clone()).await.unwrap();

        for rx in [&mut rx_a, &mut rx_b] {
            let ClientFrame::MatchFound {
                match_id,
                server_addr,
                server_port,
            } = rx.recv().await.unwrap();
            assert_eq!(match_id, event.match_id);
            assert_eq!(server_addr, "localhost");
            assert_eq!(server_port, "7777");
        }
    }

    #[tokio::test]
    async fn test_offline_player_is_skipped_without_error() {
        let (notifier, registry) = notifier_with_registry();

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        registry.register("A", tx_a, Arc::new(Notify::new()));

        // B disconnected during the provisioning window.
        notifier.handle(ready_event(&["A", "B"])).await.unwrap();

        assert!(rx_a.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_event_resends_same_frame() {
        let (notifier, registry) = notifier_with_registry();

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        registry.register("A", tx_a, Arc::new(Notify::new()));

        let event = ready_event(&["A"]);
        notifier.handle(event.clone()).await.unwrap();
        notifier.handle(event.clone()).await.unwrap();

        let first = rx_a.recv().await.unwrap();
        let second = rx_a.recv().await.unwrap();
        assert_eq!(first, second);
    }
}
