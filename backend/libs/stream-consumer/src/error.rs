//! Error types for the stream consumer loop

use thiserror::Error;

/// Result type for consumer operations
pub type ConsumerResult<T> = Result<T, ConsumerError>;

/// Errors raised by a record source or a record handler
#[derive(Error, Debug)]
pub enum ConsumerError {
    /// Broker or client failure (subscribe, commit, connection)
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// Transient transport failure while polling; the loop keeps going
    #[error("Transport error: {0}")]
    Transport(String),

    /// Record payload could not be decoded; fatal for the loop
    #[error("Malformed record at {topic}[{partition}]@{offset}: {reason}")]
    Decode {
        topic: String,
        partition: i32,
        offset: i64,
        reason: String,
    },

    /// Handler failed to apply a record; fatal for the loop
    #[error("Record processing failed: {0}")]
    Processing(String),
}

impl ConsumerError {
    /// Only transport failures are retried by the poll loop.
    pub fn is_transient(&self) -> bool {
        matches!(self, ConsumerError::Transport(_))
    }
}
