//! Recommendation store
//!
//! Durable projection of the action and similarity streams. Two consumers
//! write independently (append and upsert); the query service only reads.

mod memory;
mod pg;

pub use memory::InMemoryStore;
pub use pg::PgRecommendationStore;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_schema::{ActionEvent, ActionType, EventSimilarity};

/// Action row as persisted in `actions`
#[derive(Debug, Clone, PartialEq)]
pub struct StoredAction {
    pub user_id: i64,
    pub event_id: i64,
    pub action_type: ActionType,
    pub created_at: DateTime<Utc>,
}

impl From<&ActionEvent> for StoredAction {
    fn from(action: &ActionEvent) -> Self {
        Self {
            user_id: action.user_id,
            event_id: action.event_id,
            action_type: action.action_type,
            created_at: action.timestamp,
        }
    }
}

/// Candidate event with its score
#[derive(Debug, Clone, Copy, PartialEq, sqlx::FromRow)]
pub struct ScoredEvent {
    pub event_id: i64,
    pub score: f64,
}

impl ScoredEvent {
    pub fn new(event_id: i64, score: f64) -> Self {
        Self { event_id, score }
    }
}

#[async_trait]
pub trait RecommendationStore: Send + Sync {
    /// Append an action verbatim. Duplicates are kept.
    async fn append_action(&self, action: &ActionEvent) -> Result<()>;

    /// Insert or overwrite the score of a pair. The record is canonicalized
    /// (`event_a < event_b`) before the write.
    async fn upsert_similarity(&self, record: &EventSimilarity) -> Result<()>;

    /// Up to `limit` distinct events the user acted on, most recent first.
    async fn recent_event_ids(&self, user_id: i64, limit: usize) -> Result<Vec<i64>>;

    /// Events paired with `event_id` on either side of the pair that the user
    /// has never acted on, by score descending then event id ascending.
    async fn similar_events(
        &self,
        user_id: i64,
        event_id: i64,
        limit: usize,
    ) -> Result<Vec<ScoredEvent>>;

    /// Every recorded action on any of `event_ids`.
    async fn actions_for_events(&self, event_ids: &[i64]) -> Result<Vec<StoredAction>>;
}

/// Orders candidates by score descending, ties by event id ascending.
pub(crate) fn rank(candidates: &mut [ScoredEvent]) {
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.event_id.cmp(&b.event_id))
    });
}
