//! Recommendation store projection and query service
//!
//! - `consumers`: action and similarity stream projections
//! - `repository`: the store behind both (Postgres or in-memory)
//! - `services`: recommendation queries
//! - `grpc`: the server-streaming `RecommendationsController`
//! - `metrics`: Prometheus endpoint for the projection counters

pub mod config;
pub mod consumers;
pub mod error;
pub mod grpc;
pub mod metrics;
pub mod repository;
pub mod services;

pub use error::{AppError, Result};
