pub mod handler;
pub mod publisher;
pub mod similarity;

pub use handler::AggregationHandler;
pub use publisher::{KafkaSimilarityPublisher, PublishFailurePolicy, SimilaritySink};
pub use similarity::SimilarityAggregator;
