//! AMQP event publisher for outbound pipeline events

use crate::amqp::messages::EventCodec;
use crate::error::{MatchmakingError, Result};
use crate::types::{MatchFoundEvent, ServerReadyEvent};
use amqprs::{
    channel::{BasicPublishArguments, Channel, ExchangeDeclareArguments},
    BasicProperties,
};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Trait for publishing matchmaking pipeline events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a MatchFoundEvent keyed by its match id
    async fn publish_match_found(&self, event: MatchFoundEvent) -> Result<()>;

    /// Publish a ServerReadyEvent keyed by its match id
    async fn publish_server_ready(&self, event: ServerReadyEvent) -> Result<()>;
}

/// Configuration for event publishing
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub exchange_name: String,
    pub match_found_topic: String,
    pub server_ready_topic: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            exchange_name: "arena.events".to_string(),
            match_found_topic: "match.found".to_string(),
            server_ready_topic: "server.ready".to_string(),
            max_retries: 3,
            retry_delay_ms: 500,
        }
    }
}

/// AMQP-based event publisher implementation
pub struct AmqpEventPublisher {
    channel: Channel,
    config: PublisherConfig,
}

impl AmqpEventPublisher {
    /// Create a new event publisher and declare its exchange
    pub async fn new(channel: Channel, config: PublisherConfig) -> Result<Self> {
        let publisher = Self { channel, config };
        publisher.setup_exchange().await?;
        Ok(publisher)
    }

    /// Declare the durable topic exchange events are routed through
    async fn setup_exchange(&self) -> Result<()> {
        let args = ExchangeDeclareArguments::new(&self.config.exchange_name, "topic")
            .durable(true)
            .finish();

        self.channel
            .exchange_declare(args)
            .await
            .map_err(|e| MatchmakingError::BusError {
                message: format!("Failed to declare events exchange: {}", e),
            })?;

        info!(
            "Declared events exchange '{}'",
            self.config.exchange_name
        );
        Ok(())
    }

    /// Publish a payload to a topic with bounded retry
    async fn publish_to_topic<T>(&self, topic: &str, message_key: &str, event: &T) -> Result<()>
    where
        T: serde::Serialize,
    {
        let payload = EventCodec::encode(event)?;

        let mut retry_count = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        loop {
            match self.try_publish(topic, message_key, payload.clone()).await {
                Ok(()) => {
                    debug!(
                        "Published message {} to topic '{}'",
                        message_key, topic
                    );
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        error!(
                            "Failed to publish message {} after {} retries: {}",
                            message_key, self.config.max_retries, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "Publish attempt {} failed for message {}: {}. Retrying in {:?}",
                        retry_count, message_key, e, delay
                    );

                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(5000));
                }
            }
        }
    }

    /// Single publish attempt
    async fn try_publish(&self, topic: &str, message_key: &str, payload: Vec<u8>) -> Result<()> {
        let args = BasicPublishArguments::new(&self.config.exchange_name, topic);
        let mut properties = BasicProperties::default();
        properties
            .with_message_id(message_key)
            .with_content_type("application/json");

        self.channel
            .basic_publish(properties, payload, args)
            .await
            .map_err(|e| MatchmakingError::BusError {
                message: format!("Failed to publish message: {}", e),
            })?;

        Ok(())
    }
}

#[async_trait]
impl EventPublisher for AmqpEventPublisher {
    async fn publish_match_found(&self, event: MatchFoundEvent) -> Result<()> {
        EventCodec::validate_match_found(&event)?;
        let key = event.match_id.to_string();
        self.publish_to_topic(&self.config.match_found_topic, &key, &event)
            .await
    }

    async fn publish_server_ready(&self, event: ServerReadyEvent) -> Result<()> {
        EventCodec::validate_server_ready(&event)?;
        let key = event.match_id.to_string();
        self.publish_to_topic(&self.config.server_ready_topic, &key, &event)
            .await
    }
}

/// Bus event captured by the mock publisher
#[derive(Debug, Clone)]
pub enum PublishedEvent {
    MatchFound(MatchFoundEvent),
    ServerReady(ServerReadyEvent),
}

/// Mock event publisher for testing
#[derive(Debug, Default)]
pub struct MockEventPublisher {
    published_events: std::sync::Mutex<Vec<PublishedEvent>>,
}

impl MockEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all published events (for testing)
    pub fn get_published_events(&self) -> Vec<PublishedEvent> {
        self.published_events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Get the match-found events only
    pub fn match_found_events(&self) -> Vec<MatchFoundEvent> {
        self.get_published_events()
            .into_iter()
            .filter_map(|event| match event {
                PublishedEvent::MatchFound(event) => Some(event),
                _ => None,
            })
            .collect()
    }

    /// Get the server-ready events only
    pub fn server_ready_events(&self) -> Vec<ServerReadyEvent> {
        self.get_published_events()
            .into_iter()
            .filter_map(|event| match event {
                PublishedEvent::ServerReady(event) => Some(event),
                _ => None,
            })
            .collect()
    }

    /// Clear captured events (for testing)
    pub fn clear_events(&self) {
        if let Ok(mut events) = self.published_events.lock() {
            events.clear();
        }
    }
}

#[async_trait]
impl EventPublisher for MockEventPublisher {
    async fn publish_match_found(&self, event: MatchFoundEvent) -> Result<()> {
        if let Ok(mut events) = self.published_events.lock() {
            events.push(PublishedEvent::MatchFound(event));
        }
        Ok(())
    }

    async fn publish_server_ready(&self, event: ServerReadyEvent) -> Result<()> {
        if let Ok(mut events) = self.published_events.lock() {
            events.push(PublishedEvent::ServerReady(event));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::generate_match_id;

    #[test]
    fn test_publisher_config_default() {
        let config = PublisherConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_ms, 500);
        assert_eq!(config.match_found_topic, "match.found");
    }

    #[tokio::test]
    async fn test_mock_publisher_captures_events() {
        let publisher = MockEventPublisher::new();
        let event = MatchFoundEvent {
            match_id: generate_match_id(),
            player_ids: vec!["A".to_string(), "B".to_string()],
        };

        publisher.publish_match_found(event.clone()).await.unwrap();

        let captured = publisher.match_found_events();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0], event);
        assert!(publisher.server_ready_events().is_empty());
    }

    // Integration tests with an actual AMQP broker live in tests/
}
