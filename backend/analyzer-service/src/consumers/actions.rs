use super::store_error;
use crate::repository::RecommendationStore;
use async_trait::async_trait;
use event_schema::ActionEvent;
use std::sync::Arc;
use stream_consumer::{ConsumedRecord, ConsumerResult, RecordHandler};
use tracing::debug;

/// Appends every user action to the `actions` table.
pub struct ActionProjection {
    store: Arc<dyn RecommendationStore>,
}

impl ActionProjection {
    pub fn new(store: Arc<dyn RecommendationStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RecordHandler for ActionProjection {
    async fn handle(&mut self, record: &ConsumedRecord) -> ConsumerResult<()> {
        let action = ActionEvent::from_payload(record.payload()?)
            .map_err(|e| record.decode_error(e))?;

        self.store
            .append_action(&action)
            .await
            .map_err(|e| store_error(record, e))?;

        debug!(
            user_id = action.user_id,
            event_id = action.event_id,
            action_type = %action.action_type,
            offset = record.offset,
            "Stored action"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryStore;
    use event_schema::ActionType;
    use stream_consumer::ConsumerError;

    fn record(payload: Option<Vec<u8>>) -> ConsumedRecord {
        ConsumedRecord {
            topic: "stats.user-actions.v1".to_string(),
            partition: 0,
            offset: 7,
            key: None,
            payload,
        }
    }

    #[tokio::test]
    async fn test_appends_duplicates_verbatim() {
        let store = Arc::new(InMemoryStore::new());
        let mut projection = ActionProjection::new(store.clone());

        let action = ActionEvent::new(3, 30, ActionType::Register);
        let payload = action.to_payload().unwrap();
        projection.handle(&record(Some(payload.clone()))).await.unwrap();
        projection.handle(&record(Some(payload))).await.unwrap();

        let stored = store.actions_for_events(&[30]).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].action_type, ActionType::Register);
        assert_eq!(stored[0].created_at, action.timestamp);
    }

    #[tokio::test]
    async fn test_tombstone_is_fatal() {
        let store = Arc::new(InMemoryStore::new());
        let mut projection = ActionProjection::new(store.clone());

        let err = projection.handle(&record(None)).await.unwrap_err();
        assert!(matches!(err, ConsumerError::Decode { offset: 7, .. }));
        assert_eq!(store.action_count(), 0);
    }
}
