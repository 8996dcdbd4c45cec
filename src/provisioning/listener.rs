//! Provisioning listener
//!
//! Consumes MatchFoundEvents and spawns one allocation task per match. The
//! consume path never blocks on allocation; tasks run fully in parallel and
//! the in-flight count is observable through the diagnostics status endpoint.
//!
//! The bus delivers at-least-once, so redelivered events are dropped through
//! a bounded seen-cache keyed by match id. The TTL tracks the allocation SLA:
//! a redelivery arriving after the cache forgot the match allocates again,
//! which downstream consumers already tolerate.

use crate::amqp::consumer::EventHandler;
use crate::amqp::messages::EventCodec;
use crate::amqp::publisher::EventPublisher;
use crate::error::{MatchmakingError, Result};
use crate::metrics::MetricsCollector;
use crate::provisioning::allocator::Allocator;
use crate::types::{MatchFoundEvent, MatchId, ServerReadyEvent};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Bounded TTL cache of recently seen match ids
struct SeenCache {
    entries: HashMap<MatchId, Instant>,
    ttl: Duration,
    capacity: usize,
}

impl SeenCache {
    fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            capacity,
        }
    }

    /// Record a match id. Returns false when the id was already seen
    /// within the TTL.
    fn insert(&mut self, match_id: MatchId) -> bool {
        let now = Instant::now();
        self.entries
            .retain(|_, seen_at| now.duration_since(*seen_at) < self.ttl);

        if self.entries.contains_key(&match_id) {
            return false;
        }

        if self.entries.len() >= self.capacity {
            // Evict the oldest entry to stay bounded.
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, seen_at)| **seen_at)
                .map(|(id, _)| *id)
            {
                self.entries.remove(&oldest);
            }
        }

        self.entries.insert(match_id, now);
        true
    }
}

/// Listener that turns formed matches into ready game servers
pub struct ProvisioningListener {
    publisher: Arc<dyn EventPublisher>,
    allocator: Arc<dyn Allocator>,
    metrics: Arc<MetricsCollector>,
    in_flight: Arc<AtomicI64>,
    seen: Mutex<SeenCache>,
}

impl ProvisioningListener {
    /// Default TTL of the dedupe cache, sized to the allocation SLA
    pub const DEDUPE_TTL: Duration = Duration::from_secs(30);
    /// Upper bound on remembered match ids
    pub const DEDUPE_CAPACITY: usize = 1024;

    pub fn new(
        publisher: Arc<dyn EventPublisher>,
        allocator: Arc<dyn Allocator>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            publisher,
            allocator,
            metrics,
            in_flight: Arc::new(AtomicI64::new(0)),
            seen: Mutex::new(SeenCache::new(Self::DEDUPE_TTL, Self::DEDUPE_CAPACITY)),
        }
    }

    /// Number of allocation tasks currently running
    pub fn in_flight_allocations(&self) -> i64 {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventHandler<MatchFoundEvent> for ProvisioningListener {
    async fn handle(&self, event: MatchFoundEvent) -> Result<()> {
        if let Err(e) = EventCodec::validate_match_found(&event) {
            warn!(match_id = %event.match_id, error = %e, "Dropping invalid match event");
            return Ok(());
        }

        let fresh = {
            let mut seen = self
                .seen
                .lock()
                .map_err(|_| MatchmakingError::InternalError {
                    message: "Seen-cache lock poisoned".to_string(),
                })?;
            seen.insert(event.match_id)
        };

        if !fresh {
            self.metrics.provisioning().duplicate_events_total.inc();
            warn!(match_id = %event.match_id, "Duplicate match event dropped");
            return Ok(());
        }

        // Detach: the consume loop must keep draining while servers spin up.
        let task = AllocationTask {
            publisher: self.publisher.clone(),
            allocator: self.allocator.clone(),
            metrics: self.metrics.clone(),
            in_flight: self.in_flight.clone(),
        };
        tokio::spawn(task.run(event));

        Ok(())
    }
}

/// One detached allocation, from reservation through the ready event
struct AllocationTask {
    publisher: Arc<dyn EventPublisher>,
    allocator: Arc<dyn Allocator>,
    metrics: Arc<MetricsCollector>,
    in_flight: Arc<AtomicI64>,
}

impl AllocationTask {
    /// The in-flight count covers the whole task, success or failure.
    async fn run(self, event: MatchFoundEvent) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.metrics.provisioning().allocations_in_flight.inc();

        let match_id = event.match_id;
        match self.allocate_and_publish(event).await {
            Ok(()) => {
                self.metrics
                    .provisioning()
                    .allocations_total
                    .with_label_values(&["success"])
                    .inc();
            }
            Err(e) => {
                self.metrics
                    .provisioning()
                    .allocations_total
                    .with_label_values(&["failure"])
                    .inc();
                error!(match_id = %match_id, error = %e, "Provisioning failed; match is lost");
            }
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.metrics.provisioning().allocations_in_flight.dec();
    }

    async fn allocate_and_publish(&self, event: MatchFoundEvent) -> Result<()> {
        let match_id = event.match_id;

        let endpoint = self.allocator.allocate(match_id).await.map_err(|e| {
            MatchmakingError::ProvisioningFailure {
                match_id: match_id.to_string(),
                message: e.to_string(),
            }
        })?;

        let ready = ServerReadyEvent {
            match_id,
            player_ids: event.player_ids,
            server_addr: endpoint.addr,
            server_port: endpoint.port,
        };

        self.publisher.publish_server_ready(ready).await.map_err(|e| {
            MatchmakingError::ProvisioningFailure {
                match_id: match_id.to_string(),
                message: format!("Failed to publish server-ready event: {}", e),
            }
        })?;

        info!(match_id = %match_id, "Published server-ready event");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amqp::publisher::MockEventPublisher;
    use crate::provisioning::allocator::SimulatedAllocator;
    use crate::utils::generate_match_id;

    fn fast_listener(publisher: Arc<MockEventPublisher>) -> ProvisioningListener {
        ProvisioningListener::new(
            publisher,
            Arc::new(SimulatedAllocator::new(
                Duration::from_millis(20),
                "localhost",
                "7777",
            )),
            Arc::new(MetricsCollector::new().unwrap()),
        )
    }

    fn match_event(players: &[&str]) -> MatchFoundEvent {
        MatchFoundEvent {
            match_id: generate_match_id(),
            player_ids: players.iter().map(|p| p.to_string()).collect(),
        }
    }

    async fn wait_for_ready(publisher: &MockEventPublisher, count: usize) {
        for _ in 0..100 {
            if publisher.server_ready_events().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {} server-ready events", count);
    }

    #[tokio::test]
    async fn test_allocation_emits_ready_with_same_players() {
        let publisher = Arc::new(MockEventPublisher::new());
        let listener = fast_listener(publisher.clone());

        let event = match_event(&["A", "B"]);
        listener.handle(event.clone()).await.unwrap();

        wait_for_ready(&publisher, 1).await;
        let ready = &publisher.server_ready_events()[0];
        assert_eq!(ready.match_id, event.match_id);
        assert_eq!(ready.player_ids, event.player_ids);
        assert_eq!(ready.server_addr, "localhost");
        assert_eq!(ready.server_port, "7777");
    }

    #[tokio::test]
    async fn test_duplicate_event_allocates_once() {
        let publisher = Arc::new(MockEventPublisher::new());
        let listener = fast_listener(publisher.clone());

        let event = match_event(&["A", "B"]);
        listener.handle(event.clone()).await.unwrap();
        listener.handle(event.clone()).await.unwrap();

        wait_for_ready(&publisher, 1).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(publisher.server_ready_events().len(), 1);
    }

    #[tokio::test]
    async fn test_allocations_run_in_parallel() {
        let publisher = Arc::new(MockEventPublisher::new());
        let listener = fast_listener(publisher.clone());

        let started = Instant::now();
        for _ in 0..5 {
            listener.handle(match_event(&["A", "B"])).await.unwrap();
        }

        wait_for_ready(&publisher, 5).await;
        // Five sequential 20ms allocations would take 100ms+.
        assert!(started.elapsed() < Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_in_flight_counter_settles_to_zero() {
        let publisher = Arc::new(MockEventPublisher::new());
        let listener = fast_listener(publisher.clone());

        listener.handle(match_event(&["A", "B"])).await.unwrap();
        listener.handle(match_event(&["C", "D"])).await.unwrap();

        wait_for_ready(&publisher, 2).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(listener.in_flight_allocations(), 0);
    }

    #[tokio::test]
    async fn test_invalid_event_is_dropped() {
        let publisher = Arc::new(MockEventPublisher::new());
        let listener = fast_listener(publisher.clone());

        listener.handle(match_event(&["A", "A"])).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(publisher.server_ready_events().is_empty());
    }

    #[test]
    fn test_seen_cache_expires_and_bounds() {
        let mut cache = SeenCache::new(Duration::from_millis(10), 2);
        let a = generate_match_id();
        let b = generate_match_id();
        let c = generate_match_id();

        assert!(cache.insert(a));
        assert!(!cache.insert(a));

        assert!(cache.insert(b));
        // Capacity 2: inserting a third evicts the oldest.
        assert!(cache.insert(c));
        assert_eq!(cache.entries.len(), 2);

        std::thread::sleep(Duration::from_millis(15));
        assert!(cache.insert(a), "expired entries are forgotten");
    }
}
