//! Main application state and service coordination
//!
//! This module contains the production AppState that wires the pool, the
//! formation loop, the provisioning listener, and the session gateway, and
//! supervises their background tasks and graceful shutdown. Components talk
//! only through the event bus and the pool, so any number of process
//! instances can share one Redis and one broker.

use crate::amqp::connection::{AmqpConfig, AmqpConnection};
use crate::amqp::consumer::{EventHandler, TopicConsumer};
use crate::amqp::publisher::{AmqpEventPublisher, EventPublisher, PublisherConfig};
use crate::config::AppConfig;
use crate::gateway::http::{GatewayServer, GatewayServerConfig};
use crate::gateway::{GatewayState, InMemoryAccounts, MatchNotifier, SessionRegistry};
use crate::matchmaking::MatchmakingService;
use crate::metrics::health::{StatusSnapshot, StatusSource};
use crate::metrics::{HealthServer, HealthServerConfig, MetricsCollector};
use crate::pool::{RedisPool, WaitingPool};
use crate::provisioning::{ProvisioningListener, SimulatedAllocator};
use crate::types::{MatchFoundEvent, ServerReadyEvent};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("AMQP connection error: {message}")]
    AmqpConnection { message: String },

    #[error("Pool store error: {message}")]
    PoolStore { message: String },

    #[error("Bind error: {message}")]
    Bind { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },
}

/// Live pipeline view served through the diagnostics endpoints
struct PipelineStatusSource {
    listener: Arc<ProvisioningListener>,
    registry: Arc<SessionRegistry>,
    pool: Arc<dyn WaitingPool>,
    is_running: Arc<RwLock<bool>>,
}

#[async_trait]
impl StatusSource for PipelineStatusSource {
    async fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            healthy: *self.is_running.read().await,
            in_flight_allocations: self.listener.in_flight_allocations(),
            sessions_active: self.registry.len() as i64,
            players_waiting: self.pool.count().await.ok(),
        }
    }
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// AMQP connection shared by publishers and consumers
    amqp_connection: Arc<AmqpConnection>,

    /// Pipeline components
    matchmaking: Arc<MatchmakingService>,
    provisioning: Arc<ProvisioningListener>,
    notifier: Arc<MatchNotifier>,
    registry: Arc<SessionRegistry>,

    /// Servers
    gateway_server: Arc<GatewayServer>,
    health_server: Arc<HealthServer>,

    /// Metrics collector shared across components
    metrics_collector: Arc<MetricsCollector>,

    /// Process-wide cancellation signal
    shutdown_tx: broadcast::Sender<()>,

    /// Background task handles
    background_tasks: Vec<JoinHandle<()>>,

    /// Bus consumers, kept for cancellation
    consumers: Vec<TopicConsumer>,

    /// Service status
    is_running: Arc<RwLock<bool>>,
}

impl AppState {
    /// Initialize the application with all dependencies.
    /// Fatal dependency unavailability here is a startup failure.
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing arena-gate matchmaking backend");
        info!(
            "Configuration: service={}, amqp_url={}, redis={}",
            config.service.name, config.amqp.url, config.pool.addr
        );

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        // Pool store
        let pool: Arc<dyn WaitingPool> = Arc::new(
            RedisPool::connect(&config.pool)
                .await
                .map_err(|e| ServiceError::PoolStore {
                    message: format!("Failed to connect to Redis: {}", e),
                })?,
        );

        // Event bus
        let amqp_connection = Self::initialize_amqp(&config).await?;
        let publisher = Self::initialize_publisher(&config, &amqp_connection).await?;

        // Pipeline components
        let matchmaking = Arc::new(MatchmakingService::new(
            pool.clone(),
            publisher.clone(),
            metrics_collector.clone(),
            config.check_interval(),
            config.matchmaking.players_per_match,
        ));

        let provisioning = Arc::new(ProvisioningListener::new(
            publisher,
            Arc::new(SimulatedAllocator::default()),
            metrics_collector.clone(),
        ));

        let registry = Arc::new(SessionRegistry::new());
        let notifier = Arc::new(MatchNotifier::new(
            registry.clone(),
            metrics_collector.clone(),
        ));

        // Gateway surface; the in-memory accounts stand in for the external
        // auth and profile services.
        let accounts = Arc::new(InMemoryAccounts::new());
        let gateway_state = GatewayState {
            registry: registry.clone(),
            pool: pool.clone(),
            issuer: accounts.clone(),
            profiles: accounts,
            metrics: metrics_collector.clone(),
            read_deadline: config.read_deadline(),
            upstream_timeout: config.upstream_timeout(),
        };
        let gateway_server = Arc::new(GatewayServer::new(
            GatewayServerConfig {
                port: config.gateway.http_port,
                host: "0.0.0.0".to_string(),
            },
            gateway_state,
        ));

        let is_running = Arc::new(RwLock::new(false));

        let status_source = Arc::new(PipelineStatusSource {
            listener: provisioning.clone(),
            registry: registry.clone(),
            pool,
            is_running: is_running.clone(),
        });
        let health_server = Arc::new(
            HealthServer::new(
                HealthServerConfig {
                    port: config.service.metrics_port,
                    host: "0.0.0.0".to_string(),
                },
                metrics_collector.clone(),
            )
            .with_status_source(status_source),
        );

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            amqp_connection,
            matchmaking,
            provisioning,
            notifier,
            registry,
            gateway_server,
            health_server,
            metrics_collector,
            shutdown_tx,
            background_tasks: Vec::new(),
            consumers: Vec::new(),
            is_running,
        })
    }

    /// Start all servers, consumers, and background tasks
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting arena-gate matchmaking backend");

        *self.is_running.write().await = true;

        // Bind before spawning so a taken port fails startup, not a task.
        let gateway_listener =
            self.gateway_server
                .bind()
                .await
                .map_err(|e| ServiceError::Bind {
                    message: e.to_string(),
                })?;

        let gateway_server = self.gateway_server.clone();
        self.background_tasks.push(tokio::spawn(async move {
            if let Err(e) = gateway_server.serve(gateway_listener).await {
                error!("Gateway server failed: {}", e);
            }
        }));

        let health_server = self.health_server.clone();
        self.background_tasks.push(tokio::spawn(async move {
            if let Err(e) = health_server.start().await {
                error!("Diagnostics server failed: {}", e);
            }
        }));

        self.start_consumers().await?;

        // Formation loop
        let matchmaking = self.matchmaking.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.background_tasks.push(tokio::spawn(async move {
            matchmaking.run(shutdown_rx).await;
        }));

        self.start_uptime_task();

        info!("Arena-gate matchmaking backend started successfully");
        Ok(())
    }

    /// Subscribe the provisioning listener and the notifier to their topics
    async fn start_consumers(&mut self) -> Result<(), ServiceError> {
        let group_id = &self.config.amqp.consumer_group_id;

        let match_found_channel = self.open_channel().await?;
        let match_found_consumer =
            TopicConsumer::new(match_found_channel, &self.config.amqp.exchange_name);
        let provisioning_handler: Arc<dyn EventHandler<MatchFoundEvent>> =
            self.provisioning.clone();
        match_found_consumer
            .start_consuming(
                &self.config.amqp.match_found_topic,
                group_id,
                provisioning_handler,
            )
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to start match-found consumer: {}", e),
            })?;
        self.consumers.push(match_found_consumer);

        let server_ready_channel = self.open_channel().await?;
        let server_ready_consumer =
            TopicConsumer::new(server_ready_channel, &self.config.amqp.exchange_name);
        let notifier_handler: Arc<dyn EventHandler<ServerReadyEvent>> = self.notifier.clone();
        server_ready_consumer
            .start_consuming(
                &self.config.amqp.server_ready_topic,
                group_id,
                notifier_handler,
            )
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to start server-ready consumer: {}", e),
            })?;
        self.consumers.push(server_ready_consumer);

        Ok(())
    }

    /// Periodic task keeping the uptime gauge and component health current
    fn start_uptime_task(&mut self) {
        let metrics_collector = self.metrics_collector.clone();
        let is_running = self.is_running.clone();

        self.background_tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            let start_time = tokio::time::Instant::now();

            while *is_running.read().await {
                interval.tick().await;

                let uptime_seconds = start_time.elapsed().as_secs() as i64;
                metrics_collector
                    .service()
                    .uptime_seconds
                    .set(uptime_seconds);
                metrics_collector.update_health_status(2);
                metrics_collector.update_component_health("amqp", true);
                metrics_collector.update_component_health("pool", true);
                metrics_collector.update_component_health("gateway", true);

                debug!(uptime_seconds, "Updated service health metrics");
            }

            info!("Uptime metrics task stopped");
        }));
    }

    /// Perform graceful shutdown: stop accepting work, drain, cancel
    pub async fn shutdown(&mut self) {
        info!("Starting graceful shutdown");

        *self.is_running.write().await = false;

        // The formation loop stops between ticks on this signal.
        let _ = self.shutdown_tx.send(());

        // Consumers stop at the next delivery boundary.
        for consumer in &self.consumers {
            if let Err(e) = consumer.stop_consuming().await {
                warn!("Failed to stop consumer: {}", e);
            }
        }

        // The gateway stops accepting immediately; existing sessions are
        // evicted and their cleanup paths remove pool entries.
        self.gateway_server.stop();
        self.registry.evict_all();

        if let Err(e) = self.health_server.stop().await {
            warn!("Failed to stop diagnostics server: {}", e);
        }

        // Give servers and session tasks a moment to drain in-flight writes.
        tokio::time::sleep(Duration::from_millis(200)).await;

        for task in self.background_tasks.drain(..) {
            task.abort();
        }

        info!("Arena-gate matchmaking backend shut down");
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// In-flight allocation count, for diagnostics
    pub fn in_flight_allocations(&self) -> i64 {
        self.provisioning.in_flight_allocations()
    }

    /// Initialize AMQP connection with retry logic
    async fn initialize_amqp(config: &AppConfig) -> Result<Arc<AmqpConnection>, ServiceError> {
        info!("Connecting to AMQP broker: {}", config.amqp.url);

        let mut amqp_config = AmqpConfig::from_url(&config.amqp.url);
        amqp_config.max_retries = config.amqp.max_retry_attempts;
        amqp_config.retry_delay_ms = config.amqp.retry_delay_ms;

        let connection =
            AmqpConnection::new(amqp_config)
                .await
                .map_err(|e| ServiceError::AmqpConnection {
                    message: format!("Failed to connect to AMQP: {}", e),
                })?;

        Ok(Arc::new(connection))
    }

    /// Open a publisher channel and declare the events exchange
    async fn initialize_publisher(
        config: &AppConfig,
        amqp_connection: &Arc<AmqpConnection>,
    ) -> Result<Arc<dyn EventPublisher>, ServiceError> {
        let channel = amqp_connection
            .connection()
            .open_channel(None)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to open publisher channel: {}", e),
            })?;

        let publisher_config = PublisherConfig {
            exchange_name: config.amqp.exchange_name.clone(),
            match_found_topic: config.amqp.match_found_topic.clone(),
            server_ready_topic: config.amqp.server_ready_topic.clone(),
            max_retries: config.amqp.max_retry_attempts,
            retry_delay_ms: config.amqp.retry_delay_ms,
        };

        let publisher = AmqpEventPublisher::new(channel, publisher_config)
            .await
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to initialize event publisher: {}", e),
            })?;

        Ok(Arc::new(publisher))
    }

    async fn open_channel(&self) -> Result<amqprs::channel::Channel, ServiceError> {
        self.amqp_connection
            .connection()
            .open_channel(None)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to open consumer channel: {}", e),
            })
    }
}
