//! Metrics and monitoring for the matchmaking backend
//!
//! This module provides Prometheus metrics collection and the diagnostics
//! HTTP server exposing health checks and pipeline status.

pub mod collector;
pub mod health;

pub use collector::{
    GatewayMetrics, MetricsCollector, PipelineMetrics, ProvisioningMetrics, ServiceMetrics,
};
pub use health::{HealthServer, HealthServerConfig};
