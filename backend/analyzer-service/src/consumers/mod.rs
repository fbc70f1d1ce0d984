//! Stream projections into the recommendation store
//!
//! Each consumer runs on its own [`stream_consumer::StreamWorker`] with its
//! own consumer group. The two writers are not coordinated; the store only
//! relies on append (actions) and last-write-wins upsert (similarity).

pub mod actions;
pub mod similarity;

pub use actions::ActionProjection;
pub use similarity::SimilarityProjection;

use crate::error::AppError;
use stream_consumer::{ConsumedRecord, ConsumerError};

/// Rejected rows are malformed input; everything else stops the worker as a
/// processing failure.
fn store_error(record: &ConsumedRecord, err: AppError) -> ConsumerError {
    match err {
        AppError::Validation(reason) => record.decode_error(reason),
        other => ConsumerError::Processing(other.to_string()),
    }
}
