pub mod recommendation;

pub use recommendation::{QuerySettings, RecommendationService};
