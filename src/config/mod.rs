//! Configuration for the matchmaking backend

pub mod app;

pub use app::{
    validate_config, AmqpSettings, AppConfig, GatewaySettings, MatchmakingSettings, PoolSettings,
    ServiceSettings,
};
