use crate::services::PublishFailurePolicy;
use anyhow::{anyhow, Result};
use event_schema::topics;
use serde::Deserialize;
use std::time::Duration;
use stream_consumer::{KafkaSourceConfig, WorkerSettings};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // HTTP server config (health probes)
    pub http_host: String,
    pub http_port: u16,

    // Kafka
    pub kafka_brokers: String,
    pub kafka_group_id: String,
    pub actions_topic: String,
    pub similarity_topic: String,

    // Consume loop
    pub poll_timeout_ms: u64,
    pub commit_every: usize,
    pub drain_timeout_ms: u64,

    // Similarity publishing
    pub publish_timeout_ms: u64,
    pub publish_failure_policy: String,
    pub publish_retry_attempts: u32,
    pub publish_retry_backoff_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let config = config::Config::builder()
            .set_default("http_host", "0.0.0.0")?
            .set_default("http_port", 8090)?
            .set_default("kafka_group_id", "stats-aggregator")?
            .set_default("actions_topic", topics::USER_ACTIONS)?
            .set_default("similarity_topic", topics::EVENTS_SIMILARITY)?
            .set_default("poll_timeout_ms", 1000)?
            .set_default("commit_every", 10)?
            .set_default("drain_timeout_ms", 10_000)? // 10 seconds
            .set_default("publish_timeout_ms", 5000)?
            .set_default("publish_failure_policy", "drop")?
            .set_default("publish_retry_attempts", 3)?
            .set_default("publish_retry_backoff_ms", 200)?
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<()> {
        if self.http_port == 0 {
            return Err(anyhow!("HTTP port must be greater than 0"));
        }

        if self.kafka_brokers.is_empty() {
            return Err(anyhow!("Kafka brokers are required"));
        }

        if self.actions_topic.is_empty() || self.similarity_topic.is_empty() {
            return Err(anyhow!("Actions and similarity topics are required"));
        }

        if self.actions_topic == self.similarity_topic {
            return Err(anyhow!("Actions and similarity topics must differ"));
        }

        if self.poll_timeout_ms == 0 {
            return Err(anyhow!("Poll timeout must be greater than 0"));
        }

        self.publish_policy()?;

        Ok(())
    }

    pub fn publish_policy(&self) -> Result<PublishFailurePolicy> {
        PublishFailurePolicy::from_config(
            &self.publish_failure_policy,
            self.publish_retry_attempts,
            self.publish_retry_backoff_ms,
        )
        .map_err(|e| anyhow!(e))
    }

    pub fn kafka_source(&self) -> KafkaSourceConfig {
        KafkaSourceConfig {
            brokers: self.kafka_brokers.clone(),
            group_id: self.kafka_group_id.clone(),
            client_id: "aggregator-service".to_string(),
            topics: vec![self.actions_topic.clone()],
        }
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
            commit_every: self.commit_every,
            ..WorkerSettings::default()
        }
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}
