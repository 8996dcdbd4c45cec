//! Test fixtures and in-process fakes for integration testing

use arena_gate::amqp::consumer::EventHandler;
use arena_gate::amqp::publisher::EventPublisher;
use arena_gate::error::Result;
use arena_gate::gateway::{MatchNotifier, SessionRegistry};
use arena_gate::matchmaking::MatchmakingService;
use arena_gate::metrics::MetricsCollector;
use arena_gate::pool::{InMemoryPool, WaitingPool};
use arena_gate::provisioning::{ProvisioningListener, SimulatedAllocator};
use arena_gate::types::{ClientFrame, MatchFoundEvent, PlayerId, ServerReadyEvent};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

/// In-process event bus: publishes dispatch synchronously to every
/// subscribed handler, preserving per-publisher FIFO order the way the
/// broker preserves per-key order.
#[derive(Default)]
pub struct InMemoryBus {
    match_found_handlers: Mutex<Vec<Arc<dyn EventHandler<MatchFoundEvent>>>>,
    server_ready_handlers: Mutex<Vec<Arc<dyn EventHandler<ServerReadyEvent>>>>,
    match_found_log: Mutex<Vec<MatchFoundEvent>>,
    server_ready_log: Mutex<Vec<ServerReadyEvent>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_match_found(&self, handler: Arc<dyn EventHandler<MatchFoundEvent>>) {
        self.match_found_handlers
            .lock()
            .expect("bus lock poisoned")
            .push(handler);
    }

    pub fn subscribe_server_ready(&self, handler: Arc<dyn EventHandler<ServerReadyEvent>>) {
        self.server_ready_handlers
            .lock()
            .expect("bus lock poisoned")
            .push(handler);
    }

    /// Every MatchFoundEvent that crossed the bus
    pub fn match_found_events(&self) -> Vec<MatchFoundEvent> {
        self.match_found_log
            .lock()
            .expect("bus lock poisoned")
            .clone()
    }

    /// Every ServerReadyEvent that crossed the bus
    pub fn server_ready_events(&self) -> Vec<ServerReadyEvent> {
        self.server_ready_log
            .lock()
            .expect("bus lock poisoned")
            .clone()
    }
}

#[async_trait]
impl EventPublisher for InMemoryBus {
    async fn publish_match_found(&self, event: MatchFoundEvent) -> Result<()> {
        self.match_found_log
            .lock()
            .expect("bus lock poisoned")
            .push(event.clone());

        let handlers = self
            .match_found_handlers
            .lock()
            .expect("bus lock poisoned")
            .clone();
        for handler in handlers {
            handler.handle(event.clone()).await?;
        }
        Ok(())
    }

    async fn publish_server_ready(&self, event: ServerReadyEvent) -> Result<()> {
        self.server_ready_log
            .lock()
            .expect("bus lock poisoned")
            .push(event.clone());

        let handlers = self
            .server_ready_handlers
            .lock()
            .expect("bus lock poisoned")
            .clone();
        for handler in handlers {
            handler.handle(event.clone()).await?;
        }
        Ok(())
    }
}

/// A fake client session registered with the gateway-side registry.
/// Mirrors the admission ordering of the real gateway: registry entry
/// first, then the pool insert.
pub struct TestSession {
    pub player_id: PlayerId,
    token: u64,
    frames: mpsc::UnboundedReceiver<ClientFrame>,
    registry: Arc<SessionRegistry>,
    pool: Arc<InMemoryPool>,
}

impl TestSession {
    /// Run the gateway cleanup path: retract the registry entry, then
    /// remove the player from the pool.
    pub async fn disconnect(mut self) {
        self.frames.close();
        if self.registry.remove_if_owner(&self.player_id, self.token) {
            self.pool
                .remove(&self.player_id)
                .await
                .expect("pool remove failed");
        }
    }

    /// Wait for the next MATCH_FOUND frame on this session
    pub async fn expect_frame(&mut self, timeout: Duration) -> ClientFrame {
        tokio::time::timeout(timeout, self.frames.recv())
            .await
            .unwrap_or_else(|_| panic!("{}: timed out waiting for frame", self.player_id))
            .unwrap_or_else(|| panic!("{}: session channel closed", self.player_id))
    }

    /// Whether a frame is already queued on this session
    pub fn try_frame(&mut self) -> Option<ClientFrame> {
        self.frames.try_recv().ok()
    }
}

/// Complete in-process pipeline: pool, bus, formation loop, provisioning
/// listener, and notification fan-out.
pub struct TestHarness {
    pub pool: Arc<InMemoryPool>,
    pub bus: Arc<InMemoryBus>,
    pub registry: Arc<SessionRegistry>,
    pub matchmaking: MatchmakingService,
}

impl TestHarness {
    /// Build the pipeline with a fast (20ms) simulated allocator
    pub fn new(players_per_match: usize) -> Self {
        Self::with_allocation_delay(players_per_match, Duration::from_millis(20))
    }

    pub fn with_allocation_delay(players_per_match: usize, allocation_delay: Duration) -> Self {
        let pool = Arc::new(InMemoryPool::new());
        let bus = Arc::new(InMemoryBus::new());
        let registry = Arc::new(SessionRegistry::new());
        let metrics = Arc::new(MetricsCollector::new().expect("metrics collector"));

        let provisioning = Arc::new(ProvisioningListener::new(
            bus.clone(),
            Arc::new(SimulatedAllocator::new(allocation_delay, "localhost", "7777")),
            metrics.clone(),
        ));
        bus.subscribe_match_found(provisioning);

        let notifier = Arc::new(MatchNotifier::new(registry.clone(), metrics.clone()));
        bus.subscribe_server_ready(notifier);

        let matchmaking = MatchmakingService::new(
            pool.clone(),
            bus.clone(),
            metrics,
            Duration::from_secs(1),
            players_per_match,
        );

        Self {
            pool,
            bus,
            registry,
            matchmaking,
        }
    }

    /// Build a second formation loop sharing this harness's pool and bus,
    /// as a second matchmaking-service instance would.
    pub fn extra_formation_loop(&self, players_per_match: usize) -> MatchmakingService {
        MatchmakingService::new(
            self.pool.clone(),
            self.bus.clone(),
            Arc::new(MetricsCollector::new().expect("metrics collector")),
            Duration::from_secs(1),
            players_per_match,
        )
    }

    /// Connect a fake client: register a session and enter the pool with a
    /// pinned enqueue score so wait order is deterministic.
    pub fn connect(&self, player_id: &str, score: u64) -> TestSession {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = self.registry.register(player_id, tx, Arc::new(Notify::new()));
        self.pool.add_with_score(player_id, score);

        TestSession {
            player_id: player_id.to_string(),
            token,
            frames: rx,
            registry: self.registry.clone(),
            pool: self.pool.clone(),
        }
    }

    /// Wait until the bus has carried at least `count` server-ready events
    pub async fn wait_for_server_ready(&self, count: usize, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.bus.server_ready_events().len() < count {
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "timed out waiting for {} server-ready events (saw {})",
                    count,
                    self.bus.server_ready_events().len()
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
