//! Similarity aggregator
//!
//! Consumes the user action stream, keeps per-event user weights in memory and
//! publishes a fresh similarity score for every event pair an action touches.
//! State lives for the process lifetime of a single instance.

pub mod config;
pub mod error;
pub mod metrics;
pub mod services;

pub use error::{AppError, Result};
pub use metrics::PublishMetrics;
pub use services::{AggregationHandler, PublishFailurePolicy, SimilarityAggregator, SimilaritySink};
