use super::publisher::{PublishFailurePolicy, SimilaritySink};
use crate::metrics::PublishMetrics;
use super::similarity::SimilarityAggregator;
use async_trait::async_trait;
use event_schema::{ActionEvent, EventSimilarity};
use std::sync::Arc;
use std::time::Duration;
use stream_consumer::{ConsumedRecord, ConsumerError, ConsumerResult, RecordHandler};
use tracing::{debug, error, info, warn};

/// Feeds user actions into the aggregator and publishes every updated pair.
pub struct AggregationHandler {
    state: SimilarityAggregator,
    sink: Arc<dyn SimilaritySink>,
    policy: PublishFailurePolicy,
    drain_timeout: Duration,
    metrics: PublishMetrics,
}

impl AggregationHandler {
    pub fn new(
        sink: Arc<dyn SimilaritySink>,
        policy: PublishFailurePolicy,
        drain_timeout: Duration,
        metrics: PublishMetrics,
    ) -> Self {
        Self {
            state: SimilarityAggregator::new(),
            sink,
            policy,
            drain_timeout,
            metrics,
        }
    }

    pub fn state(&self) -> &SimilarityAggregator {
        &self.state
    }

    pub fn metrics(&self) -> &PublishMetrics {
        &self.metrics
    }

    /// Apply a decoded action and publish the resulting pair updates.
    pub async fn process(&mut self, action: &ActionEvent) -> ConsumerResult<()> {
        let updates = self.state.apply(action);
        if updates.is_empty() {
            debug!(
                user_id = action.user_id,
                event_id = action.event_id,
                action_type = %action.action_type,
                "Action does not raise user weight"
            );
            return Ok(());
        }

        for record in &updates {
            self.publish(record).await?;
        }
        Ok(())
    }

    async fn publish(&mut self, record: &EventSimilarity) -> ConsumerResult<()> {
        let attempts = match self.policy {
            PublishFailurePolicy::Retry { attempts, .. } => attempts.max(1),
            _ => 1,
        };

        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.sink.publish(record).await {
                Ok(()) => {
                    self.metrics.record_published();
                    return Ok(());
                }
                Err(e) => {
                    self.metrics.record_failed_attempt();
                    warn!(
                        event_a = record.event_a,
                        event_b = record.event_b,
                        attempt = attempt,
                        error = %e,
                        "Similarity publish failed"
                    );
                    last_error = Some(e);
                    if let PublishFailurePolicy::Retry { backoff, .. } = self.policy {
                        if attempt < attempts {
                            tokio::time::sleep(backoff).await;
                        }
                    }
                }
            }
        }

        let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
        match self.policy {
            PublishFailurePolicy::Halt => Err(ConsumerError::Processing(format!(
                "publish of pair {}:{} failed: {}",
                record.event_a, record.event_b, reason
            ))),
            _ => {
                self.metrics.record_dropped();
                error!(
                    event_a = record.event_a,
                    event_b = record.event_b,
                    score = record.score,
                    "Dropping similarity update"
                );
                Ok(())
            }
        }
    }
}

#[async_trait]
impl RecordHandler for AggregationHandler {
    async fn handle(&mut self, record: &ConsumedRecord) -> ConsumerResult<()> {
        let payload = record.payload()?;
        let action = ActionEvent::from_payload(payload).map_err(|e| record.decode_error(e))?;
        self.process(&action).await
    }

    async fn drain(&mut self) -> ConsumerResult<()> {
        self.sink
            .flush(self.drain_timeout)
            .await
            .map_err(|e| ConsumerError::Processing(e.to_string()))?;

        info!(
            events = self.state.event_count(),
            pairs = self.state.pair_count(),
            published = self.metrics.published(),
            dropped = self.metrics.dropped(),
            "Aggregator drained"
        );
        Ok(())
    }
}
