use chrono::Utc;
use event_schema::{canonical_pair, ActionEvent, EventSimilarity};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Incremental item-item similarity over a stream of user actions.
///
/// State per event:
/// - `weights[event][user]`: strongest action weight the user ever had on the event
/// - `totals[event]`: sum of `weights[event][*]`
///
/// State per pair (`a < b`):
/// - `intersections[(a, b)]`: sum over users who touched both of
///   `min(weights[a][u], weights[b][u])`
///
/// `user_events[user]` bounds the cost of an update to the number of events
/// the acting user has touched.
///
/// The score of a pair is `intersection / sqrt(total_a * total_b)`.
///
/// Not thread-safe on purpose: exactly one consumer task owns an instance
/// and applies actions one at a time.
#[derive(Debug, Default)]
pub struct SimilarityAggregator {
    weights: HashMap<i64, HashMap<i64, f64>>,
    totals: HashMap<i64, f64>,
    user_events: HashMap<i64, HashSet<i64>>,
    intersections: HashMap<(i64, i64), f64>,
}

impl SimilarityAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one action and return the recomputed similarity of every pair
    /// whose intersection may have changed, sorted by `(event_a, event_b)`.
    ///
    /// An action that is not stronger than what is already stored for the
    /// `(event, user)` pair changes nothing and returns no records, which
    /// makes redelivered actions harmless.
    pub fn apply(&mut self, action: &ActionEvent) -> Vec<EventSimilarity> {
        let user = action.user_id;
        let event = action.event_id;
        let new_weight = action.weight();

        let user_weights = self.weights.entry(event).or_default();
        let old_weight = user_weights.get(&user).copied().unwrap_or(0.0);

        if new_weight <= old_weight {
            debug!(
                user_id = user,
                event_id = event,
                old_weight,
                new_weight,
                "Action not stronger than stored weight, skipping"
            );
            return Vec::new();
        }

        user_weights.insert(user, new_weight);
        *self.totals.entry(event).or_insert(0.0) += new_weight - old_weight;

        let touched = self.user_events.entry(user).or_default();
        touched.insert(event);

        let now = Utc::now();
        let total_event = self.totals.get(&event).copied().unwrap_or(0.0);
        let mut updates = Vec::with_capacity(touched.len().saturating_sub(1));

        for &other in touched.iter() {
            if other == event {
                continue;
            }

            let other_weight = self
                .weights
                .get(&other)
                .and_then(|users| users.get(&user))
                .copied()
                .unwrap_or(0.0);
            let delta = new_weight.min(other_weight) - old_weight.min(other_weight);

            let intersection = self
                .intersections
                .entry(canonical_pair(event, other))
                .or_insert(0.0);
            *intersection += delta;

            let total_other = self.totals.get(&other).copied().unwrap_or(0.0);
            if total_event <= 0.0 || total_other <= 0.0 {
                continue;
            }

            let score = score(*intersection, total_event, total_other);
            updates.push(EventSimilarity::new(event, other, score, now));
        }

        updates.sort_by_key(|record| (record.event_a, record.event_b));

        debug!(
            user_id = user,
            event_id = event,
            old_weight,
            new_weight,
            updates = updates.len(),
            "Applied action"
        );

        updates
    }

    /// Stored weight of `user` for `event` (0 when the user never acted on it).
    pub fn weight(&self, event: i64, user: i64) -> f64 {
        self.weights
            .get(&event)
            .and_then(|users| users.get(&user))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn total_weight(&self, event: i64) -> f64 {
        self.totals.get(&event).copied().unwrap_or(0.0)
    }

    /// `None` when the two events never co-occurred for any user.
    pub fn intersection(&self, a: i64, b: i64) -> Option<f64> {
        self.intersections.get(&canonical_pair(a, b)).copied()
    }

    /// Current similarity of a pair, if it has co-occurred and both totals are positive.
    pub fn similarity(&self, a: i64, b: i64) -> Option<f64> {
        let intersection = self.intersection(a, b)?;
        let (total_a, total_b) = (self.total_weight(a), self.total_weight(b));
        if total_a <= 0.0 || total_b <= 0.0 {
            return None;
        }
        Some(score(intersection, total_a, total_b))
    }

    pub fn events_of(&self, user: i64) -> Option<&HashSet<i64>> {
        self.user_events.get(&user)
    }

    pub fn event_count(&self) -> usize {
        self.totals.len()
    }

    pub fn pair_count(&self) -> usize {
        self.intersections.len()
    }
}

fn score(intersection: f64, total_a: f64, total_b: f64) -> f64 {
    // min() absorbs rounding drift of the incremental sums
    (intersection / (total_a * total_b).sqrt()).min(1.0)
}
