//! AMQP integration for the matchmaking backend
//!
//! This module handles broker connections, event publishing, and
//! consumer-group subscription for the matchmaking pipeline.

pub mod connection;
pub mod consumer;
pub mod messages;
pub mod publisher;

// Re-export commonly used types
pub use connection::{AmqpConfig, AmqpConnection};
pub use consumer::{EventHandler, TopicConsumer};
pub use messages::EventCodec;
pub use publisher::EventPublisher;
