//! # Stream Consumer Library
//!
//! Single-worker, cooperative poll loop shared by every stream consumer in
//! the stats pipeline (aggregator, action projection, similarity projection).
//!
//! ## Lifecycle
//!
//! ```text
//! INIT → SUBSCRIBED → POLLING ──(shutdown | fatal error)──→ DRAINING → CLOSED
//!                        ↺ poll(timeout) → handle → mark offset → maybe commit
//! ```
//!
//! - One record is handled at a time; the handler is owned by the worker and
//!   is never shared, so handlers may keep plain (non-`Sync`) state.
//! - A record's offset becomes eligible for commit only after its handler
//!   returned `Ok`.
//! - Offsets are committed asynchronously every `commit_every` records and
//!   synchronously while draining.
//! - Transport errors on poll are logged and retried; handler errors are
//!   fatal and end the loop (there is no dead-letter topic).
//! - Processed records, handler failures, commits and transport errors are
//!   counted in Prometheus counters labelled with the worker name.
//! - Shutdown is cooperative: a `watch` channel flips to `true`, the current
//!   poll is abandoned, and the worker drains.
//!
//! ## Usage
//!
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let source = KafkaSource::new(&kafka_config)?;
//! let metrics = ConsumerMetrics::register(prometheus::default_registry(), "aggregator")?;
//! let worker = StreamWorker::new(metrics, source, handler, WorkerSettings::default(), shutdown_rx);
//! let phase = worker.phase();
//! let handle = tokio::spawn(worker.run());
//! // ... on SIGTERM:
//! shutdown_tx.send(true).ok();
//! handle.await??;
//! ```

mod error;
mod kafka;
mod metrics;
mod offsets;
mod worker;

pub use error::{ConsumerError, ConsumerResult};
pub use kafka::{KafkaSource, KafkaSourceConfig};
pub use metrics::ConsumerMetrics;
pub use offsets::{OffsetTracker, PartitionOffset};
pub use worker::{StreamWorker, WorkerSettings};

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Phase of a [`StreamWorker`], published through a `watch` channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerPhase {
    Init,
    Subscribed,
    Polling,
    Draining,
    Closed,
}

impl fmt::Display for ConsumerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConsumerPhase::Init => "init",
            ConsumerPhase::Subscribed => "subscribed",
            ConsumerPhase::Polling => "polling",
            ConsumerPhase::Draining => "draining",
            ConsumerPhase::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
    Async,
    Sync,
}

/// Owned copy of a polled record.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumedRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
}

impl ConsumedRecord {
    /// Payload bytes, or a decode error for tombstones / empty records.
    pub fn payload(&self) -> ConsumerResult<&[u8]> {
        self.payload
            .as_deref()
            .ok_or_else(|| self.decode_error("record has no payload"))
    }

    pub fn decode_error(&self, reason: impl fmt::Display) -> ConsumerError {
        ConsumerError::Decode {
            topic: self.topic.clone(),
            partition: self.partition,
            offset: self.offset,
            reason: reason.to_string(),
        }
    }
}

/// Where records come from.
#[async_trait]
pub trait RecordSource: Send {
    async fn subscribe(&mut self) -> ConsumerResult<()>;

    /// Wait up to `timeout` for the next record. `Ok(None)` means the
    /// timeout elapsed with nothing to read.
    async fn poll(&mut self, timeout: Duration) -> ConsumerResult<Option<ConsumedRecord>>;

    fn commit(&mut self, offsets: &[PartitionOffset], mode: CommitMode) -> ConsumerResult<()>;

    fn close(&mut self) {}
}

/// What to do with each record.
#[async_trait]
pub trait RecordHandler: Send {
    /// Apply one record. Any error stops the loop.
    async fn handle(&mut self, record: &ConsumedRecord) -> ConsumerResult<()>;

    /// Flush outstanding side effects before offsets are committed on drain.
    async fn drain(&mut self) -> ConsumerResult<()> {
        Ok(())
    }
}
