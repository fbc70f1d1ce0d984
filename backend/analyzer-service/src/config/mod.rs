use crate::services::QuerySettings;
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

    // gRPC server config
    pub grpc_host: String,
    pub grpc_port: u16,

    // PostgreSQL
    pub database_url: String,
    pub db_max_connections: u32,

    // Kafka
    pub kafka_brokers: String,
    pub kafka_actions_group_id: String,
    pub kafka_similarity_group_id: String,
    pub actions_topic: String,
    pub similarity_topic: String,
    pub poll_timeout_ms: u64,
    pub commit_every: usize,

    // Query serving
    pub recent_interactions_limit: usize,
    pub query_timeout_ms: u64,
    pub max_results_limit: usize,
    pub max_interaction_event_ids: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let config = config::Config::builder()
            .set_default("http_host", "0.0.0.0")?
            .set_default("http_port", 8091)?
            .set_default("grpc_host", "0.0.0.0")?
            .set_default("grpc_port", 9091)?
            .set_default("db_max_connections", 10)?
            .set_default("kafka_actions_group_id", "stats-analyzer-actions")?
            .set_default("kafka_similarity_group_id", "stats-analyzer-similarity")?
            .set_default("actions_topic", topics::USER_ACTIONS)?
            .set_default("similarity_topic", topics::EVENTS_SIMILARITY)?
            .set_default("poll_timeout_ms", 1000)?
            .set_default("commit_every", 10)?
            .set_default("recent_interactions_limit", 20)?
            .set_default("query_timeout_ms", 3000)?
            .set_default("max_results_limit", 100)?
            .set_default("max_interaction_event_ids", 500)?
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<()> {
        if self.http_port == 0 {
            return Err(anyhow!("HTTP port must be greater than 0"));
        }

        if self.grpc_port == 0 {
            return Err(anyhow!("gRPC port must be greater than 0"));
        }

        if self.http_port == self.grpc_port {
            return Err(anyhow!("HTTP and gRPC ports must differ"));
        }

        if self.database_url.is_empty() {
            return Err(anyhow!("Database URL is required"));
        }

        if self.kafka_brokers.is_empty() {
            return Err(anyhow!("Kafka brokers are required"));
        }

        if self.kafka_actions_group_id == self.kafka_similarity_group_id {
            return Err(anyhow!("Action and similarity consumers need distinct group ids"));
        }

        if self.recent_interactions_limit == 0 {
            return Err(anyhow!("recent_interactions_limit must be at least 1"));
        }

        if self.max_results_limit == 0 || self.max_results_limit > 1000 {
            return Err(anyhow!("max_results_limit must be between 1 and 1000"));
        }

        if self.max_interaction_event_ids == 0 || self.max_interaction_event_ids > 10_000 {
            return Err(anyhow!(
                "max_interaction_event_ids must be between 1 and 10000"
            ));
        }

        if self.query_timeout_ms == 0 {
            return Err(anyhow!("Query timeout must be greater than 0"));
        }

        Ok(())
    }

    pub fn query_settings(&self) -> QuerySettings {
        QuerySettings {
            recent_interactions_limit: self.recent_interactions_limit,
            max_results_limit: self.max_results_limit,
            max_interaction_event_ids: self.max_interaction_event_ids,
            query_timeout: Duration::from_millis(self.query_timeout_ms),
        }
    }

    pub fn actions_source(&self) -> KafkaSourceConfig {
        KafkaSourceConfig {
            brokers: self.kafka_brokers.clone(),
            group_id: self.kafka_actions_group_id.clone(),
            client_id: "analyzer-service-actions".to_string(),
            topics: vec![self.actions_topic.clone()],
        }
    }

    pub fn similarity_source(&self) -> KafkaSourceConfig {
        KafkaSourceConfig {
            brokers: self.kafka_brokers.clone(),
            group_id: self.kafka_similarity_group_id.clone(),
            client_id: "analyzer-service-similarity".to_string(),
            topics: vec![self.similarity_topic.clone()],
        }
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
            commit_every: self.commit_every,
            ..WorkerSettings::default()
        }
    }
}
