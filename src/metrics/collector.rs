//! Metrics collection using Prometheus

use anyhow::Result;
use prometheus::{IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};
use std::sync::Arc;

/// Main metrics collector for the matchmaking backend
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Formation-pipeline metrics
    pipeline_metrics: PipelineMetrics,

    /// Provisioning metrics
    provisioning_metrics: ProvisioningMetrics,

    /// Gateway metrics
    gateway_metrics: GatewayMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Formation-pipeline metrics
#[derive(Clone)]
pub struct PipelineMetrics {
    /// Formation ticks executed
    pub formation_ticks_total: IntCounter,

    /// Matches formed and published
    pub matches_formed_total: IntCounter,

    /// Players taken out of the pool into matches
    pub players_matched_total: IntCounter,

    /// Publish failures by topic
    pub publish_failures_total: IntCounterVec,
}

/// Provisioning metrics
#[derive(Clone)]
pub struct ProvisioningMetrics {
    /// Allocation tasks currently running
    pub allocations_in_flight: IntGauge,

    /// Completed allocations by outcome
    pub allocations_total: IntCounterVec,

    /// Redelivered match events dropped by the dedupe cache
    pub duplicate_events_total: IntCounter,
}

/// Gateway metrics
#[derive(Clone)]
pub struct GatewayMetrics {
    /// Live WebSocket sessions
    pub sessions_active: IntGauge,

    /// Sessions accepted since start
    pub sessions_opened_total: IntCounter,

    /// Sessions terminated since start
    pub sessions_closed_total: IntCounter,

    /// Match notifications by outcome (sent, offline, failed)
    pub notifications_total: IntCounterVec,

    /// Pool operations that failed from the gateway
    pub pool_errors_total: IntCounter,
}

impl MetricsCollector {
    /// Create a collector with a fresh registry and register every metric
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let service_metrics = ServiceMetrics {
            uptime_seconds: IntGauge::with_opts(Opts::new(
                "arena_gate_uptime_seconds",
                "Service uptime in seconds",
            ))?,
            health_status: IntGauge::with_opts(Opts::new(
                "arena_gate_health_status",
                "Health status: 0=unhealthy, 1=degraded, 2=healthy",
            ))?,
            component_health: IntGaugeVec::new(
                Opts::new(
                    "arena_gate_component_health",
                    "Per-component health: 0=down, 1=up",
                ),
                &["component"],
            )?,
        };

        let pipeline_metrics = PipelineMetrics {
            formation_ticks_total: IntCounter::with_opts(Opts::new(
                "arena_gate_formation_ticks_total",
                "Formation ticks executed",
            ))?,
            matches_formed_total: IntCounter::with_opts(Opts::new(
                "arena_gate_matches_formed_total",
                "Matches formed and published",
            ))?,
            players_matched_total: IntCounter::with_opts(Opts::new(
                "arena_gate_players_matched_total",
                "Players grouped into matches",
            ))?,
            publish_failures_total: IntCounterVec::new(
                Opts::new(
                    "arena_gate_publish_failures_total",
                    "Event publish failures by topic",
                ),
                &["topic"],
            )?,
        };

        let provisioning_metrics = ProvisioningMetrics {
            allocations_in_flight: IntGauge::with_opts(Opts::new(
                "arena_gate_allocations_in_flight",
                "Allocation tasks currently running",
            ))?,
            allocations_total: IntCounterVec::new(
                Opts::new(
                    "arena_gate_allocations_total",
                    "Completed allocations by outcome",
                ),
                &["outcome"],
            )?,
            duplicate_events_total: IntCounter::with_opts(Opts::new(
                "arena_gate_duplicate_events_total",
                "Redelivered match events dropped by the dedupe cache",
            ))?,
        };

        let gateway_metrics = GatewayMetrics {
            sessions_active: IntGauge::with_opts(Opts::new(
                "arena_gate_sessions_active",
                "Live WebSocket sessions",
            ))?,
            sessions_opened_total: IntCounter::with_opts(Opts::new(
                "arena_gate_sessions_opened_total",
                "Sessions accepted since start",
            ))?,
            sessions_closed_total: IntCounter::with_opts(Opts::new(
                "arena_gate_sessions_closed_total",
                "Sessions terminated since start",
            ))?,
            notifications_total: IntCounterVec::new(
                Opts::new(
                    "arena_gate_notifications_total",
                    "Match notifications by outcome",
                ),
                &["outcome"],
            )?,
            pool_errors_total: IntCounter::with_opts(Opts::new(
                "arena_gate_gateway_pool_errors_total",
                "Pool operations that failed from the gateway",
            ))?,
        };

        registry.register(Box::new(service_metrics.uptime_seconds.clone()))?;
        registry.register(Box::new(service_metrics.health_status.clone()))?;
        registry.register(Box::new(service_metrics.component_health.clone()))?;
        registry.register(Box::new(pipeline_metrics.formation_ticks_total.clone()))?;
        registry.register(Box::new(pipeline_metrics.matches_formed_total.clone()))?;
        registry.register(Box::new(pipeline_metrics.players_matched_total.clone()))?;
        registry.register(Box::new(pipeline_metrics.publish_failures_total.clone()))?;
        registry.register(Box::new(provisioning_metrics.allocations_in_flight.clone()))?;
        registry.register(Box::new(provisioning_metrics.allocations_total.clone()))?;
        registry.register(Box::new(provisioning_metrics.duplicate_events_total.clone()))?;
        registry.register(Box::new(gateway_metrics.sessions_active.clone()))?;
        registry.register(Box::new(gateway_metrics.sessions_opened_total.clone()))?;
        registry.register(Box::new(gateway_metrics.sessions_closed_total.clone()))?;
        registry.register(Box::new(gateway_metrics.notifications_total.clone()))?;
        registry.register(Box::new(gateway_metrics.pool_errors_total.clone()))?;

        Ok(Self {
            registry,
            service_metrics,
            pipeline_metrics,
            provisioning_metrics,
            gateway_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn pipeline(&self) -> &PipelineMetrics {
        &self.pipeline_metrics
    }

    pub fn provisioning(&self) -> &ProvisioningMetrics {
        &self.provisioning_metrics
    }

    pub fn gateway(&self) -> &GatewayMetrics {
        &self.gateway_metrics
    }

    /// Update overall health status (0=unhealthy, 1=degraded, 2=healthy)
    pub fn update_health_status(&self, status: i64) {
        self.service_metrics.health_status.set(status);
    }

    /// Update a component's health gauge
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(if healthy { 1 } else { 0 });
    }
}
