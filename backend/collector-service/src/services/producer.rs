//! User action producer
//!
//! Publishes accepted actions to the action stream, keyed by user id so that
//! one user's actions stay ordered within a partition.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use event_schema::ActionEvent;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use std::time::Duration;
use tracing::{debug, error, info};

#[async_trait]
pub trait ActionPublisher: Send + Sync {
    /// Publish one action and wait for the broker acknowledgement.
    async fn publish(&self, action: &ActionEvent) -> Result<()>;
}

pub struct KafkaActionProducer {
    producer: FutureProducer,
    topic: String,
    delivery_timeout: Duration,
}

impl KafkaActionProducer {
    pub fn new(brokers: &str, topic: &str, delivery_timeout: Duration) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("max.in.flight.requests.per.connection", "5")
            .set("retries", "3")
            .set("compression.type", "lz4")
            .set("linger.ms", "5")
            .set("message.timeout.ms", &delivery_timeout.as_millis().to_string())
            .create()?;

        info!(brokers = %brokers, topic = %topic, "Action producer initialized");

        Ok(Self {
            producer,
            topic: topic.to_string(),
            delivery_timeout,
        })
    }
}

#[async_trait]
impl ActionPublisher for KafkaActionProducer {
    async fn publish(&self, action: &ActionEvent) -> Result<()> {
        let payload = action.to_payload()?;
        let key = action.key();

        let record = FutureRecord::to(&self.topic).key(&key).payload(&payload);

        match self.producer.send(record, self.delivery_timeout).await {
            Ok((partition, offset)) => {
                debug!(
                    user_id = action.user_id,
                    event_id = action.event_id,
                    action_type = %action.action_type,
                    partition = partition,
                    offset = offset,
                    "Published user action"
                );
                Ok(())
            }
            Err((err, _)) => {
                error!(
                    user_id = action.user_id,
                    event_id = action.event_id,
                    error = %err,
                    "Failed to publish user action"
                );
                Err(AppError::Kafka(err.to_string()))
            }
        }
    }
}
