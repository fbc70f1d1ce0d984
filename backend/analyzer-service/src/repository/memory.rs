use super::{rank, RecommendationStore, ScoredEvent, StoredAction};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_schema::{ActionEvent, EventSimilarity};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Tables {
    actions: Vec<StoredAction>,
    similarity: BTreeMap<(i64, i64), (f64, DateTime<Utc>)>,
}

/// Process-local store with the same semantics as the Postgres tables.
/// Used by tests and local runs without a database.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| AppError::Internal("in-memory store lock poisoned".to_string()))
    }

    pub fn action_count(&self) -> usize {
        self.tables().map(|t| t.actions.len()).unwrap_or(0)
    }

    /// Stored score of the canonical pair, if any.
    pub fn similarity(&self, a: i64, b: i64) -> Option<f64> {
        let key = event_schema::canonical_pair(a, b);
        self.tables()
            .ok()
            .and_then(|t| t.similarity.get(&key).map(|(score, _)| *score))
    }
}

#[async_trait]
impl RecommendationStore for InMemoryStore {
    async fn append_action(&self, action: &ActionEvent) -> Result<()> {
        self.tables()?.actions.push(StoredAction::from(action));
        Ok(())
    }

    async fn upsert_similarity(&self, record: &EventSimilarity) -> Result<()> {
        if record.event_a == record.event_b {
            return Err(AppError::Validation(format!(
                "event {} cannot be paired with itself",
                record.event_a
            )));
        }
        let key = event_schema::canonical_pair(record.event_a, record.event_b);
        self.tables()?
            .similarity
            .insert(key, (record.score, record.timestamp));
        Ok(())
    }

    async fn recent_event_ids(&self, user_id: i64, limit: usize) -> Result<Vec<i64>> {
        let tables = self.tables()?;
        let mut latest: HashMap<i64, DateTime<Utc>> = HashMap::new();
        for action in tables.actions.iter().filter(|a| a.user_id == user_id) {
            let seen = latest.entry(action.event_id).or_insert(action.created_at);
            if action.created_at > *seen {
                *seen = action.created_at;
            }
        }

        let mut events: Vec<(i64, DateTime<Utc>)> = latest.into_iter().collect();
        events.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
        Ok(events.into_iter().take(limit).map(|(id, _)| id).collect())
    }

    async fn similar_events(
        &self,
        user_id: i64,
        event_id: i64,
        limit: usize,
    ) -> Result<Vec<ScoredEvent>> {
        let tables = self.tables()?;
        let seen: HashSet<i64> = tables
            .actions
            .iter()
            .filter(|a| a.user_id == user_id)
            .map(|a| a.event_id)
            .collect();

        let mut candidates: Vec<ScoredEvent> = tables
            .similarity
            .iter()
            .filter_map(|(&(a, b), &(score, _))| {
                let other = if a == event_id {
                    b
                } else if b == event_id {
                    a
                } else {
                    return None;
                };
                (!seen.contains(&other)).then_some(ScoredEvent::new(other, score))
            })
            .collect();

        rank(&mut candidates);
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn actions_for_events(&self, event_ids: &[i64]) -> Result<Vec<StoredAction>> {
        let wanted: HashSet<i64> = event_ids.iter().copied().collect();
        Ok(self
            .tables()?
            .actions
            .iter()
            .filter(|a| wanted.contains(&a.event_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use event_schema::ActionType;

    fn action_at(user: i64, event: i64, kind: ActionType, secs: i64) -> ActionEvent {
        let mut action = ActionEvent::new(user, event, kind);
        action.timestamp = Utc.timestamp_opt(secs, 0).unwrap();
        action
    }

    #[tokio::test]
    async fn test_upsert_is_last_write_wins_on_canonical_key() {
        let store = InMemoryStore::new();
        let now = Utc::now();

        store.upsert_similarity(&EventSimilarity::new(1, 2, 0.3, now)).await.unwrap();
        let swapped = EventSimilarity {
            event_a: 2,
            event_b: 1,
            score: 0.7,
            timestamp: now,
        };
        store.upsert_similarity(&swapped).await.unwrap();

        assert_eq!(store.similarity(1, 2), Some(0.7));
    }

    #[tokio::test]
    async fn test_self_pair_is_rejected() {
        let store = InMemoryStore::new();
        let record = EventSimilarity {
            event_a: 5,
            event_b: 5,
            score: 1.0,
            timestamp: Utc::now(),
        };
        assert!(matches!(
            store.upsert_similarity(&record).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_recent_events_are_distinct_and_newest_first() {
        let store = InMemoryStore::new();
        store.append_action(&action_at(1, 10, ActionType::View, 1)).await.unwrap();
        store.append_action(&action_at(1, 20, ActionType::View, 2)).await.unwrap();
        store.append_action(&action_at(1, 10, ActionType::Like, 3)).await.unwrap();
        store.append_action(&action_at(2, 30, ActionType::View, 4)).await.unwrap();

        assert_eq!(store.recent_event_ids(1, 10).await.unwrap(), vec![10, 20]);
        assert_eq!(store.recent_event_ids(1, 1).await.unwrap(), vec![10]);
        assert!(store.recent_event_ids(3, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_similar_events_from_either_side_excluding_seen() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store.upsert_similarity(&EventSimilarity::new(1, 5, 0.9, now)).await.unwrap();
        store.upsert_similarity(&EventSimilarity::new(5, 7, 0.4, now)).await.unwrap();
        store.upsert_similarity(&EventSimilarity::new(5, 3, 0.4, now)).await.unwrap();
        store.upsert_similarity(&EventSimilarity::new(8, 9, 0.99, now)).await.unwrap();
        store.append_action(&ActionEvent::new(42, 1, ActionType::View)).await.unwrap();

        let similar = store.similar_events(42, 5, 10).await.unwrap();
        assert_eq!(similar, vec![ScoredEvent::new(3, 0.4), ScoredEvent::new(7, 0.4)]);

        let similar = store.similar_events(43, 5, 1).await.unwrap();
        assert_eq!(similar, vec![ScoredEvent::new(1, 0.9)]);
    }

    #[tokio::test]
    async fn test_duplicate_actions_are_kept() {
        let store = InMemoryStore::new();
        let action = ActionEvent::new(1, 10, ActionType::View);
        store.append_action(&action).await.unwrap();
        store.append_action(&action).await.unwrap();

        assert_eq!(store.action_count(), 2);
        assert_eq!(store.actions_for_events(&[10, 11]).await.unwrap().len(), 2);
        assert!(store.actions_for_events(&[11]).await.unwrap().is_empty());
    }
}
