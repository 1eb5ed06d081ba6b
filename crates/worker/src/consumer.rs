//! RabbitMQ consumption: topology, QoS, and the sequential delivery loop.

use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};
use thiserror::Error;
use tracing::Span;

use courier_common::config::RabbitMqConfig;
use courier_common::error::{DecodeError, StartupError, StorageError};
use courier_common::types::EmailLog;

use crate::decoder;
use crate::dispatcher::Dispatcher;

/// Why a delivery could not be fully processed.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// How a delivery is settled with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processed and logged.
    Ack,
    /// Poison message. Dropped without requeue.
    Reject,
    /// Outcome not persisted. Redelivered by the broker.
    Requeue,
}

impl Disposition {
    pub fn for_outcome(outcome: &Result<EmailLog, PipelineError>) -> Self {
        match outcome {
            Ok(_) => Disposition::Ack,
            Err(PipelineError::Decode(_)) => Disposition::Reject,
            Err(PipelineError::Storage(_)) => Disposition::Requeue,
        }
    }

    /// Negative acknowledgement to send, or `None` for a plain ack.
    pub fn nack_options(self) -> Option<BasicNackOptions> {
        match self {
            Disposition::Ack => None,
            Disposition::Reject => Some(BasicNackOptions {
                multiple: false,
                requeue: false,
            }),
            Disposition::Requeue => Some(BasicNackOptions {
                multiple: false,
                requeue: true,
            }),
        }
    }
}

/// Decode and dispatch one delivery body.
pub async fn process(dispatcher: &Dispatcher, payload: &[u8]) -> Result<EmailLog, PipelineError> {
    let message = decoder::decode(payload)?;
    Ok(dispatcher.dispatch(&message).await?)
}

fn exchange_kind(kind: &str) -> ExchangeKind {
    match kind {
        "direct" => ExchangeKind::Direct,
        "fanout" => ExchangeKind::Fanout,
        "topic" => ExchangeKind::Topic,
        "headers" => ExchangeKind::Headers,
        other => ExchangeKind::Custom(other.to_string()),
    }
}

/// One broker connection with a single channel.
pub struct QueueConsumer {
    connection: Connection,
    channel: Channel,
    config: RabbitMqConfig,
    channel_closed: AtomicBool,
    connection_closed: AtomicBool,
    span: Span,
}

impl QueueConsumer {
    pub async fn connect(config: &RabbitMqConfig, span: Span) -> Result<Self, StartupError> {
        tracing::info!(parent: &span, "Connecting to RabbitMQ...");

        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(|e| StartupError::Broker(format!("failed to connect: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| StartupError::Broker(format!("failed to open channel: {e}")))?;

        tracing::info!(parent: &span, "Connected to RabbitMQ");

        Ok(Self {
            connection,
            channel,
            config: config.clone(),
            channel_closed: AtomicBool::new(false),
            connection_closed: AtomicBool::new(false),
            span,
        })
    }

    /// Declare the exchange and queue and bind them. Safe to repeat.
    pub async fn setup_topology(&self) -> Result<(), StartupError> {
        let cfg = &self.config;

        self.channel
            .exchange_declare(
                &cfg.exchange,
                exchange_kind(&cfg.exchange_type),
                ExchangeDeclareOptions {
                    passive: false,
                    durable: cfg.durable,
                    auto_delete: cfg.auto_delete,
                    internal: cfg.internal,
                    nowait: cfg.no_wait,
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                StartupError::Broker(format!("failed to declare exchange {}: {e}", cfg.exchange))
            })?;

        let queue = self
            .channel
            .queue_declare(
                &cfg.queue,
                QueueDeclareOptions {
                    passive: false,
                    durable: cfg.durable,
                    exclusive: cfg.exclusive,
                    auto_delete: cfg.auto_delete,
                    nowait: cfg.no_wait,
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                StartupError::Broker(format!("failed to declare queue {}: {e}", cfg.queue))
            })?;

        self.channel
            .queue_bind(
                &cfg.queue,
                &cfg.exchange,
                &cfg.routing_key,
                QueueBindOptions {
                    nowait: cfg.no_wait,
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| StartupError::Broker(format!("failed to bind queue: {e}")))?;

        tracing::info!(
            parent: &self.span,
            exchange = %cfg.exchange,
            exchange_type = %cfg.exchange_type,
            queue = %cfg.queue,
            routing_key = %cfg.routing_key,
            messages = queue.message_count(),
            "RabbitMQ topology ready"
        );

        Ok(())
    }

    /// Apply QoS and register the consumer.
    pub async fn consume(&self) -> Result<Consumer, StartupError> {
        let cfg = &self.config;

        if cfg.prefetch_size != 0 {
            tracing::warn!(
                parent: &self.span,
                prefetch_size = cfg.prefetch_size,
                "RabbitMQ does not support prefetch size, ignoring"
            );
        }

        self.channel
            .basic_qos(
                cfg.prefetch_count,
                BasicQosOptions {
                    global: cfg.global_qos,
                },
            )
            .await
            .map_err(|e| StartupError::Broker(format!("failed to set QoS: {e}")))?;

        let consumer = self
            .channel
            .basic_consume(
                &cfg.queue,
                &cfg.consumer_tag,
                BasicConsumeOptions {
                    no_local: cfg.no_local,
                    no_ack: cfg.auto_ack,
                    exclusive: cfg.exclusive,
                    nowait: cfg.no_wait,
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| StartupError::Broker(format!("failed to start consumer: {e}")))?;

        tracing::info!(
            parent: &self.span,
            queue = %cfg.queue,
            consumer_tag = %cfg.consumer_tag,
            prefetch_count = cfg.prefetch_count,
            auto_ack = cfg.auto_ack,
            "Started consuming messages"
        );

        Ok(consumer)
    }

    /// Process deliveries one at a time until the stream ends.
    ///
    /// Returns `Ok` when the consumer was cancelled and the error when the
    /// channel or connection failed.
    pub async fn run(
        &self,
        mut deliveries: Consumer,
        dispatcher: &Dispatcher,
    ) -> Result<(), lapin::Error> {
        while let Some(delivery) = deliveries.next().await {
            let delivery = match delivery {
                Ok(delivery) => delivery,
                Err(e) => {
                    tracing::error!(parent: &self.span, error = %e, "Delivery stream failed");
                    return Err(e);
                }
            };

            let outcome = process(dispatcher, &delivery.data).await;
            if let Err(PipelineError::Decode(e)) = &outcome {
                tracing::warn!(
                    parent: &self.span,
                    delivery_tag = delivery.delivery_tag,
                    error = %e,
                    "Dropping malformed message"
                );
            }

            self.settle(&delivery, Disposition::for_outcome(&outcome))
                .await;
        }

        tracing::info!(parent: &self.span, "Delivery stream ended");
        Ok(())
    }

    async fn settle(&self, delivery: &Delivery, disposition: Disposition) {
        let tag = delivery.delivery_tag;

        if self.config.auto_ack {
            tracing::debug!(
                parent: &self.span,
                delivery_tag = tag,
                ?disposition,
                "Auto-ack enabled, not settling"
            );
            return;
        }

        let result = match disposition.nack_options() {
            None => delivery.acker.ack(BasicAckOptions::default()).await,
            Some(options) => delivery.acker.nack(options).await,
        };

        match result {
            Ok(()) => tracing::debug!(
                parent: &self.span,
                delivery_tag = tag,
                ?disposition,
                "Delivery settled"
            ),
            Err(e) => tracing::error!(
                parent: &self.span,
                delivery_tag = tag,
                ?disposition,
                error = %e,
                "Failed to settle delivery"
            ),
        }
    }

    /// Stop the broker from pushing more deliveries. The stream ends once the
    /// in-flight delivery is done.
    pub async fn cancel(&self) {
        if let Err(e) = self
            .channel
            .basic_cancel(&self.config.consumer_tag, BasicCancelOptions::default())
            .await
        {
            tracing::warn!(parent: &self.span, error = %e, "Failed to cancel consumer");
        }
    }

    /// Close the channel, then the connection. Each step runs at most once.
    pub async fn close(&self) {
        if !self.channel_closed.swap(true, Ordering::SeqCst) {
            match self.channel.close(200, "shutdown").await {
                Ok(()) => tracing::info!(parent: &self.span, "RabbitMQ channel closed"),
                Err(e) => {
                    tracing::warn!(parent: &self.span, error = %e, "Failed to close channel")
                }
            }
        }

        if !self.connection_closed.swap(true, Ordering::SeqCst) {
            match self.connection.close(200, "shutdown").await {
                Ok(()) => tracing::info!(parent: &self.span, "RabbitMQ connection closed"),
                Err(e) => {
                    tracing::warn!(parent: &self.span, error = %e, "Failed to close connection")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use courier_common::types::DeliveryStatus;

    use super::*;
    use crate::dispatcher::tests::{MemoryStorage, StubProvider, message};

    fn dispatcher(provider: Arc<StubProvider>, storage: Arc<MemoryStorage>) -> Dispatcher {
        Dispatcher::new(provider, storage, Span::none())
    }

    #[test]
    fn test_exchange_kind_parsing() {
        assert_eq!(exchange_kind("direct"), ExchangeKind::Direct);
        assert_eq!(exchange_kind("fanout"), ExchangeKind::Fanout);
        assert_eq!(exchange_kind("topic"), ExchangeKind::Topic);
        assert_eq!(exchange_kind("headers"), ExchangeKind::Headers);
        assert_eq!(
            exchange_kind("x-delayed-message"),
            ExchangeKind::Custom("x-delayed-message".to_string())
        );
    }

    #[test]
    fn test_nack_options_follow_disposition() {
        assert!(Disposition::Ack.nack_options().is_none());

        let reject = Disposition::Reject.nack_options().unwrap();
        assert!(!reject.requeue);
        assert!(!reject.multiple);

        let requeue = Disposition::Requeue.nack_options().unwrap();
        assert!(requeue.requeue);
        assert!(!requeue.multiple);
    }

    #[tokio::test]
    async fn test_full_success_is_acked() {
        let provider = Arc::new(StubProvider::ok());
        let storage = Arc::new(MemoryStorage::new(false));
        let payload = serde_json::to_vec(&message(&["a@x.com"])).unwrap();

        let outcome = process(&dispatcher(provider, storage.clone()), &payload).await;

        assert_eq!(Disposition::for_outcome(&outcome), Disposition::Ack);
        assert_eq!(outcome.unwrap().status, DeliveryStatus::Success);
        assert_eq!(storage.logs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_send_failure_is_still_acked() {
        let provider = Arc::new(StubProvider::failing("network down"));
        let storage = Arc::new(MemoryStorage::new(false));
        let payload = serde_json::to_vec(&message(&["a@x.com"])).unwrap();

        let outcome = process(&dispatcher(provider, storage), &payload).await;

        assert_eq!(Disposition::for_outcome(&outcome), Disposition::Ack);
        assert_eq!(outcome.unwrap().status, DeliveryStatus::Failed);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_rejected_without_sending() {
        let provider = Arc::new(StubProvider::ok());
        let storage = Arc::new(MemoryStorage::new(false));

        let outcome = process(
            &dispatcher(provider.clone(), storage.clone()),
            b"{\"email\":",
        )
        .await;

        assert!(matches!(outcome, Err(PipelineError::Decode(_))));
        assert_eq!(Disposition::for_outcome(&outcome), Disposition::Reject);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert!(storage.logs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_is_requeued() {
        let provider = Arc::new(StubProvider::ok());
        let storage = Arc::new(MemoryStorage::new(true));
        let payload = serde_json::to_vec(&message(&["a@x.com"])).unwrap();

        let outcome = process(&dispatcher(provider, storage), &payload).await;

        assert!(matches!(outcome, Err(PipelineError::Storage(_))));
        assert_eq!(Disposition::for_outcome(&outcome), Disposition::Requeue);
    }
}
