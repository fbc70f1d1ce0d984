//! Similarity stream publisher
//!
//! Publishes recomputed pair scores to the similarity topic.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use event_schema::EventSimilarity;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use std::time::Duration;
use tracing::{debug, info};

/// Destination of similarity records
#[async_trait]
pub trait SimilaritySink: Send + Sync {
    /// Publish one record and wait for the delivery report.
    async fn publish(&self, record: &EventSimilarity) -> Result<()>;

    /// Block until in-flight records are delivered or `timeout` elapses.
    async fn flush(&self, timeout: Duration) -> Result<()>;
}

/// What to do when a similarity record cannot be published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishFailurePolicy {
    /// Log the failure and drop the record. The pair keeps its previous
    /// score downstream until its next update.
    Drop,
    /// Try up to `attempts` times in total, then drop.
    Retry { attempts: u32, backoff: Duration },
    /// Stop the consumer; the action's offset is not committed.
    Halt,
}

impl PublishFailurePolicy {
    /// Build from the `publish_failure_policy` config value (`drop`, `retry`, `halt`).
    pub fn from_config(name: &str, attempts: u32, backoff_ms: u64) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(PublishFailurePolicy::Drop),
            "retry" => {
                if attempts == 0 {
                    return Err(AppError::Configuration(
                        "publish_retry_attempts must be at least 1".to_string(),
                    ));
                }
                Ok(PublishFailurePolicy::Retry {
                    attempts,
                    backoff: Duration::from_millis(backoff_ms),
                })
            }
            "halt" => Ok(PublishFailurePolicy::Halt),
            other => Err(AppError::Configuration(format!(
                "Invalid publish_failure_policy: {}. Must be one of: drop, retry, halt",
                other
            ))),
        }
    }
}

/// Kafka producer for the similarity topic
pub struct KafkaSimilarityPublisher {
    producer: FutureProducer,
    topic: String,
    delivery_timeout: Duration,
}

impl KafkaSimilarityPublisher {
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

        info!(brokers = %brokers, topic = %topic, "Similarity publisher initialized");

        Ok(Self {
            producer,
            topic: topic.to_string(),
            delivery_timeout,
        })
    }
}

#[async_trait]
impl SimilaritySink for KafkaSimilarityPublisher {
    async fn publish(&self, record: &EventSimilarity) -> Result<()> {
        let payload = record.to_payload()?;
        let key = record.key();

        let message = FutureRecord::to(&self.topic).key(&key).payload(&payload);

        match self.producer.send(message, self.delivery_timeout).await {
            Ok((partition, offset)) => {
                debug!(
                    event_a = record.event_a,
                    event_b = record.event_b,
                    score = record.score,
                    partition = partition,
                    offset = offset,
                    "Published similarity"
                );
                Ok(())
            }
            // Logged by the failure policy in the handler
            Err((err, _)) => Err(AppError::Kafka(err.to_string())),
        }
    }

    async fn flush(&self, timeout: Duration) -> Result<()> {
        self.producer
            .flush(timeout)
            .map_err(|e| AppError::Kafka(e.to_string()))
    }
}
