//! User action collector
//!
//! gRPC gateway that validates a user interaction and publishes it to the
//! action stream. A call succeeds only once the broker acknowledged the record.

pub mod config;
pub mod error;
pub mod grpc;
pub mod services;

pub use error::{AppError, Result};
