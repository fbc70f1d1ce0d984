use anyhow::{anyhow, Result};
use event_schema::topics;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // gRPC server config
    pub grpc_host: String,
    pub grpc_port: u16,

    // Kafka
    pub kafka_brokers: String,
    pub actions_topic: String,
    pub publish_timeout_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let config = config::Config::builder()
            .set_default("grpc_host", "0.0.0.0")?
            .set_default("grpc_port", 9090)?
            .set_default("actions_topic", topics::USER_ACTIONS)?
            .set_default("publish_timeout_ms", 5000)?
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<()> {
        if self.grpc_port == 0 {
            return Err(anyhow!("gRPC port must be greater than 0"));
        }

        if self.kafka_brokers.is_empty() {
            return Err(anyhow!("Kafka brokers are required"));
        }

        if self.actions_topic.is_empty() {
            return Err(anyhow!("Actions topic is required"));
        }

        if self.publish_timeout_ms == 0 {
            return Err(anyhow!("Publish timeout must be greater than 0"));
        }

        Ok(())
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}
