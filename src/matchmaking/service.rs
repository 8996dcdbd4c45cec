//! The match-formation loop
//!
//! Every tick asks the pool for the longest-waiting players; on success a
//! match id is minted and a MatchFoundEvent published. The pool take is
//! atomic, so any number of loop instances can share one pool without
//! double-matching (each player leaves the pool exactly once).

use crate::amqp::publisher::EventPublisher;
use crate::error::{MatchmakingError, Result};
use crate::metrics::MetricsCollector;
use crate::pool::WaitingPool;
use crate::types::MatchFoundEvent;
use crate::utils::generate_match_id;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Periodic formation loop over a shared waiting pool
pub struct MatchmakingService {
    pool: Arc<dyn WaitingPool>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<MetricsCollector>,
    check_interval: Duration,
    players_per_match: usize,
}

impl MatchmakingService {
    pub fn new(
        pool: Arc<dyn WaitingPool>,
        publisher: Arc<dyn EventPublisher>,
        metrics: Arc<MetricsCollector>,
        check_interval: Duration,
        players_per_match: usize,
    ) -> Self {
        Self {
            pool,
            publisher,
            metrics,
            check_interval,
            players_per_match,
        }
    }

    /// Run the formation loop until the shutdown signal fires.
    /// The loop is preemptible at every tick boundary.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_seconds = self.check_interval.as_secs(),
            players_per_match = self.players_per_match,
            "Match formation loop started"
        );

        let mut interval = tokio::time::interval(self.check_interval);
        // The first tick of tokio's interval fires immediately; skip it so
        // ticks land on interval boundaries like a wall-clock ticker.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Match formation loop stopping");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "Formation tick failed");
                    }
                }
            }
        }
    }

    /// One formation tick: take players, mint a match, publish.
    ///
    /// A pool error skips the tick; the players are still waiting and the
    /// next tick retries naturally. A publish error after the pool take is
    /// the loss window: the players are already gone from the pool, so it is
    /// logged at critical severity and surfaced as PublishAfterPopFailure.
    pub async fn tick(&self) -> Result<Option<MatchFoundEvent>> {
        self.metrics.pipeline().formation_ticks_total.inc();

        let Some(players) = self.pool.try_form_match(self.players_per_match).await? else {
            debug!("No match formed this tick");
            return Ok(None);
        };

        let match_id = generate_match_id();
        let event = MatchFoundEvent {
            match_id,
            player_ids: players,
        };

        info!(match_id = %match_id, players = ?event.player_ids, "Processing found match");

        if let Err(e) = self.publisher.publish_match_found(event.clone()).await {
            self.metrics
                .pipeline()
                .publish_failures_total
                .with_label_values(&["match.found"])
                .inc();

            // The players were removed by the pool take and the event never
            // reached the bus; they are effectively dropped.
            let loss = MatchmakingError::PublishAfterPopFailure {
                match_id: match_id.to_string(),
                message: e.to_string(),
            };
            error!(match_id = %match_id, players = ?event.player_ids, error = %e,
                "CRITICAL: match removed from pool but never published");
            return Err(loss.into());
        }

        self.metrics.pipeline().matches_formed_total.inc();
        self.metrics
            .pipeline()
            .players_matched_total
            .inc_by(event.player_ids.len() as u64);

        info!(match_id = %match_id, "MatchFoundEvent published");
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amqp::publisher::MockEventPublisher;
    use crate::pool::InMemoryPool;
    use crate::types::{MatchFoundEvent, ServerReadyEvent};
    use async_trait::async_trait;

    fn service_with(
        pool: Arc<InMemoryPool>,
        publisher: Arc<dyn EventPublisher>,
        players_per_match: usize,
    ) -> MatchmakingService {
        MatchmakingService::new(
            pool,
            publisher,
            Arc::new(MetricsCollector::new().unwrap()),
            Duration::from_secs(1),
            players_per_match,
        )
    }

    #[tokio::test]
    async fn test_tick_forms_match_in_wait_order() {
        let pool = Arc::new(InMemoryPool::new());
        pool.add_with_score("A", 100);
        pool.add_with_score("B", 101);
        pool.add_with_score("C", 102);

        let publisher = Arc::new(MockEventPublisher::new());
        let service = service_with(pool.clone(), publisher.clone(), 2);

        let event = service.tick().await.unwrap().unwrap();
        assert_eq!(event.player_ids, vec!["A".to_string(), "B".to_string()]);

        let published = publisher.match_found_events();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].match_id, event.match_id);
        assert_eq!(pool.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_tick_with_insufficient_players_publishes_nothing() {
        let pool = Arc::new(InMemoryPool::new());
        pool.add_with_score("A", 100);

        let publisher = Arc::new(MockEventPublisher::new());
        let service = service_with(pool.clone(), publisher.clone(), 2);

        assert!(service.tick().await.unwrap().is_none());
        assert!(publisher.get_published_events().is_empty());
        assert!(pool.contains("A"));
    }

    #[tokio::test]
    async fn test_ticks_mint_distinct_match_ids() {
        let pool = Arc::new(InMemoryPool::new());
        for i in 0..4 {
            pool.add_with_score(&format!("p{}", i), i);
        }

        let publisher = Arc::new(MockEventPublisher::new());
        let service = service_with(pool, publisher.clone(), 2);

        let first = service.tick().await.unwrap().unwrap();
        let second = service.tick().await.unwrap().unwrap();
        assert_ne!(first.match_id, second.match_id);
        assert!(first.player_ids.iter().all(|p| !second.player_ids.contains(p)));
    }

    struct FailingPublisher;

    #[async_trait]
    impl EventPublisher for FailingPublisher {
        async fn publish_match_found(&self, _event: MatchFoundEvent) -> Result<()> {
            Err(MatchmakingError::BusError {
                message: "broker unreachable".to_string(),
            }
            .into())
        }

        async fn publish_server_ready(&self, _event: ServerReadyEvent) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_publish_failure_after_pop_is_surfaced() {
        let pool = Arc::new(InMemoryPool::new());
        pool.add_with_score("A", 100);
        pool.add_with_score("B", 101);

        let service = service_with(pool.clone(), Arc::new(FailingPublisher), 2);

        let err = service.tick().await.unwrap_err();
        let kind = err.downcast_ref::<MatchmakingError>().unwrap();
        assert!(matches!(
            kind,
            MatchmakingError::PublishAfterPopFailure { .. }
        ));
        // The loss window is real: the players are no longer in the pool.
        assert_eq!(pool.count().await.unwrap(), 0);
    }
}
