use thiserror::Error;
use tonic::Status as GrpcStatus;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Kafka error: {0}")]
    Kafka(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<rdkafka::error::KafkaError> for AppError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        AppError::Kafka(err.to_string())
    }
}

impl From<event_schema::SchemaError> for AppError {
    fn from(err: event_schema::SchemaError) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<::config::ConfigError> for AppError {
    fn from(err: ::config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

// The caller only learns whether the action was accepted.
impl From<AppError> for GrpcStatus {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Validation(msg) => GrpcStatus::invalid_argument(msg),
            _ => GrpcStatus::internal(err.to_string()),
        }
    }
}
