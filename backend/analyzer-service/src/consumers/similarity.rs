use super::store_error;
use crate::repository::RecommendationStore;
use async_trait::async_trait;
use event_schema::EventSimilarity;
use std::sync::Arc;
use stream_consumer::{ConsumedRecord, ConsumerResult, RecordHandler};
use tracing::{debug, warn};

/// Upserts similarity records into `event_similarity`.
pub struct SimilarityProjection {
    store: Arc<dyn RecommendationStore>,
}

impl SimilarityProjection {
    pub fn new(store: Arc<dyn RecommendationStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RecordHandler for SimilarityProjection {
    async fn handle(&mut self, record: &ConsumedRecord) -> ConsumerResult<()> {
        let similarity = EventSimilarity::from_payload(record.payload()?)
            .map_err(|e| record.decode_error(e))?;

        if !similarity.is_canonical() {
            warn!(
                event_a = similarity.event_a,
                event_b = similarity.event_b,
                offset = record.offset,
                "Similarity pair is not in canonical order"
            );
        }

        self.store
            .upsert_similarity(&similarity)
            .await
            .map_err(|e| store_error(record, e))?;

        debug!(
            event_a = similarity.event_a,
            event_b = similarity.event_b,
            score = similarity.score,
            "Stored similarity"
        );
        Ok(())
    }
}
