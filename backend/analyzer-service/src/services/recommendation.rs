//! Recommendation queries
//!
//! Item-based collaborative filtering over the projected tables:
//! 1. Similar events: pairs of a seed event the user has not acted on yet
//! 2. User recommendations: similar events of the user's most recent seeds,
//!    merged by maximum score (not summed)
//! 3. Interaction counts: per event, sum over users of each user's strongest
//!    action weight
//!
//! Missing data is never an error; it yields an empty result.

use crate::error::{AppError, Result};
use crate::repository::{rank, RecommendationStore, ScoredEvent};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Query limits and timeouts
#[derive(Debug, Clone)]
pub struct QuerySettings {
    /// Number of distinct recent events used as seeds
    pub recent_interactions_limit: usize,
    /// Upper bound applied to any requested `max_results`
    pub max_results_limit: usize,
    /// Maximum number of event ids per interactions-count request
    pub max_interaction_event_ids: usize,
    /// Deadline for each store call
    pub query_timeout: Duration,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            recent_interactions_limit: 20,
            max_results_limit: 100,
            max_interaction_event_ids: 500,
            query_timeout: Duration::from_secs(5),
        }
    }
}

/// Stateless query façade over a [`RecommendationStore`]
#[derive(Clone)]
pub struct RecommendationService {
    store: Arc<dyn RecommendationStore>,
    settings: QuerySettings,
}

impl RecommendationService {
    pub fn new(store: Arc<dyn RecommendationStore>, settings: QuerySettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    /// Events similar to `event_id` that `user_id` has not interacted with.
    pub async fn similar_events(
        &self,
        user_id: i64,
        event_id: i64,
        max_results: i32,
    ) -> Result<Vec<ScoredEvent>> {
        let limit = self.result_limit(max_results)?;

        let similar = self
            .timed(
                "similar_events",
                self.store.similar_events(user_id, event_id, limit),
            )
            .await?;

        debug!(
            user_id = user_id,
            event_id = event_id,
            results = similar.len(),
            "Similar events resolved"
        );
        Ok(similar)
    }

    /// Personalized recommendations seeded by the user's recent interactions.
    pub async fn recommendations_for_user(
        &self,
        user_id: i64,
        max_results: i32,
    ) -> Result<Vec<ScoredEvent>> {
        let limit = self.result_limit(max_results)?;

        let seeds = self
            .timed(
                "recent_event_ids",
                self.store
                    .recent_event_ids(user_id, self.settings.recent_interactions_limit),
            )
            .await?;

        if seeds.is_empty() {
            info!(user_id = user_id, "User has no interactions, nothing to recommend");
            return Ok(Vec::new());
        }

        let mut best: HashMap<i64, f64> = HashMap::new();
        for seed in &seeds {
            let similar = self
                .timed(
                    "similar_events",
                    self.store.similar_events(user_id, *seed, limit),
                )
                .await?;

            for candidate in similar {
                best.entry(candidate.event_id)
                    .and_modify(|score| *score = score.max(candidate.score))
                    .or_insert(candidate.score);
            }
        }

        let mut recommendations: Vec<ScoredEvent> = best
            .into_iter()
            .map(|(event_id, score)| ScoredEvent::new(event_id, score))
            .collect();
        rank(&mut recommendations);
        recommendations.truncate(limit);

        info!(
            user_id = user_id,
            seeds = seeds.len(),
            results = recommendations.len(),
            "Recommendations resolved"
        );
        Ok(recommendations)
    }

    /// Aggregate engagement per event, ordered by event id.
    pub async fn interactions_count(&self, event_ids: &[i64]) -> Result<Vec<ScoredEvent>> {
        if event_ids.len() > self.settings.max_interaction_event_ids {
            return Err(AppError::Validation(format!(
                "Cannot count interactions for more than {} events at once",
                self.settings.max_interaction_event_ids
            )));
        }

        let mut ids = event_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let actions = self
            .timed("actions_for_events", self.store.actions_for_events(&ids))
            .await?;

        // event -> user -> strongest weight
        let mut strongest: BTreeMap<i64, HashMap<i64, f64>> = BTreeMap::new();
        for action in &actions {
            let weight = action.action_type.weight();
            strongest
                .entry(action.event_id)
                .or_default()
                .entry(action.user_id)
                .and_modify(|w| *w = w.max(weight))
                .or_insert(weight);
        }

        Ok(strongest
            .into_iter()
            .map(|(event_id, users)| ScoredEvent::new(event_id, users.values().sum()))
            .collect())
    }

    fn result_limit(&self, max_results: i32) -> Result<usize> {
        if max_results <= 0 {
            return Err(AppError::Validation(format!(
                "max_results must be positive, got {}",
                max_results
            )));
        }
        Ok((max_results as usize).min(self.settings.max_results_limit))
    }

    async fn timed<T, F>(&self, operation: &str, query: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.settings.query_timeout, query)
            .await
            .map_err(|_| {
                AppError::Timeout(format!(
                    "{} exceeded {}ms",
                    operation,
                    self.settings.query_timeout.as_millis()
                ))
            })?
    }
}
