use thiserror::Error;
use tonic::Status as GrpcStatus;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Kafka error: {0}")]
    Kafka(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<rdkafka::error::KafkaError> for AppError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        AppError::Kafka(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
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

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        AppError::Timeout(err.to_string())
    }
}

// Convert to gRPC Status for gRPC handlers
impl From<AppError> for GrpcStatus {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Validation(msg) => GrpcStatus::invalid_argument(msg),
            AppError::Timeout(msg) => GrpcStatus::deadline_exceeded(msg),
            AppError::Database(msg) | AppError::Kafka(msg) => GrpcStatus::unavailable(msg),
            _ => GrpcStatus::internal(err.to_string()),
        }
    }
}
