//! Consumer-group subscription over AMQP
//!
//! A topic maps to a routing key on the events exchange; a consumer group
//! maps to one shared durable queue bound to that key. Replicas consuming
//! the same queue split the message load without duplication, and a crash
//! before acknowledgement causes redelivery, giving at-least-once semantics.

use crate::amqp::messages::EventCodec;
use crate::error::{MatchmakingError, Result};
use amqprs::{
    channel::{
        BasicAckArguments, BasicCancelArguments, BasicConsumeArguments, Channel,
        ExchangeDeclareArguments, QueueBindArguments, QueueDeclareArguments,
    },
    consumer::AsyncConsumer,
    BasicProperties, Deliver,
};
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Trait implemented by components that process one kind of bus event
#[async_trait]
pub trait EventHandler<E>: Send + Sync {
    async fn handle(&self, event: E) -> Result<()>;
}

/// Consumer that subscribes a handler to one topic under a consumer group
pub struct TopicConsumer {
    channel: Channel,
    consumer_tag: String,
    exchange_name: String,
}

impl TopicConsumer {
    pub fn new(channel: Channel, exchange_name: &str) -> Self {
        let consumer_tag = format!("consumer-{}", uuid::Uuid::new_v4());

        Self {
            channel,
            consumer_tag,
            exchange_name: exchange_name.to_string(),
        }
    }

    /// Declare the exchange and the group queue, bind them, and start
    /// delivering decoded events to the handler.
    pub async fn start_consuming<E>(
        &self,
        topic: &str,
        group_id: &str,
        handler: Arc<dyn EventHandler<E>>,
    ) -> Result<()>
    where
        E: serde::de::DeserializeOwned + Send + 'static,
    {
        let exchange_args = ExchangeDeclareArguments::new(&self.exchange_name, "topic")
            .durable(true)
            .finish();
        self.channel
            .exchange_declare(exchange_args)
            .await
            .map_err(|e| MatchmakingError::BusError {
                message: format!("Failed to declare exchange: {}", e),
            })?;

        // One durable queue per (topic, group): replicas share the load.
        let queue_name = format!("{}.{}", topic, group_id);
        let queue_args = QueueDeclareArguments::new(&queue_name)
            .durable(true)
            .auto_delete(false)
            .finish();
        self.channel
            .queue_declare(queue_args)
            .await
            .map_err(|e| MatchmakingError::BusError {
                message: format!("Failed to declare queue {}: {}", queue_name, e),
            })?;

        let bind_args = QueueBindArguments::new(&queue_name, &self.exchange_name, topic);
        self.channel
            .queue_bind(bind_args)
            .await
            .map_err(|e| MatchmakingError::BusError {
                message: format!("Failed to bind queue {}: {}", queue_name, e),
            })?;

        let consume_args = BasicConsumeArguments::new(&queue_name, &self.consumer_tag)
            .manual_ack(true)
            .finish();

        self.channel
            .basic_consume(EventConsumer::<E>::new(handler), consume_args)
            .await
            .map_err(|e| MatchmakingError::BusError {
                message: format!("Failed to start consuming: {}", e),
            })?;

        info!(
            "Consuming topic '{}' through group queue '{}'",
            topic, queue_name
        );
        Ok(())
    }

    /// Stop consuming messages
    pub async fn stop_consuming(&self) -> Result<()> {
        let args = BasicCancelArguments::new(&self.consumer_tag);

        self.channel
            .basic_cancel(args)
            .await
            .map_err(|e| MatchmakingError::BusError {
                message: format!("Failed to stop consuming: {}", e),
            })?;

        info!("Stopped consuming messages");
        Ok(())
    }
}

/// Internal consumer that decodes payloads and dispatches to the handler
struct EventConsumer<E> {
    handler: Arc<dyn EventHandler<E>>,
    _event: PhantomData<fn() -> E>,
}

impl<E> EventConsumer<E> {
    fn new(handler: Arc<dyn EventHandler<E>>) -> Self {
        Self {
            handler,
            _event: PhantomData,
        }
    }
}

#[async_trait]
impl<E> AsyncConsumer for EventConsumer<E>
where
    E: serde::de::DeserializeOwned + Send + 'static,
{
    async fn consume(
        &mut self,
        channel: &Channel,
        deliver: Deliver,
        _basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        let delivery_tag = deliver.delivery_tag();
        let routing_key = deliver.routing_key().to_string();

        match EventCodec::decode::<E>(&content) {
            Ok(event) => {
                if let Err(e) = self.handler.handle(event).await {
                    error!(
                        routing_key = %routing_key,
                        delivery_tag,
                        error = %e,
                        "Event handler failed"
                    );
                }
            }
            Err(e) => {
                warn!(
                    routing_key = %routing_key,
                    delivery_tag,
                    error = %e,
                    "Dropping undecodable event"
                );
            }
        }

        // Ack after dispatch: handlers spawn long work instead of blocking
        // here, so redelivery only covers crashes before this point.
        let ack_args = BasicAckArguments::new(delivery_tag, false);
        if let Err(e) = channel.basic_ack(ack_args).await {
            warn!(delivery_tag, error = %e, "Failed to ack message");
        }
    }
}

/// Mock event handler that records everything it receives
pub struct RecordingHandler<E> {
    pub received: Arc<tokio::sync::Mutex<Vec<E>>>,
}

impl<E> Default for RecordingHandler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> RecordingHandler<E> {
    pub fn new() -> Self {
        Self {
            received: Arc::new(tokio::sync::Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl<E: Send + 'static> EventHandler<E> for RecordingHandler<E> {
    async fn handle(&self, event: E) -> Result<()> {
        let mut received = self.received.lock().await;
        received.push(event);
        Ok(())
    }
}
