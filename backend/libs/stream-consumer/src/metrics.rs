//! Prometheus counters for one stream worker

use prometheus::{IntCounter, Opts, Registry};

/// Counters of a single worker, labelled `worker="<name>"`.
///
/// Clones share the underlying counters, so a caller can keep a handle
/// after moving the metrics into a [`crate::StreamWorker`].
#[derive(Clone)]
pub struct ConsumerMetrics {
    worker: String,
    records_processed: IntCounter,
    record_failures: IntCounter,
    offset_commits: IntCounter,
    transport_errors: IntCounter,
}

impl ConsumerMetrics {
    /// Create the counters for `worker` and register them on `registry`.
    ///
    /// Several workers may share a registry as long as their names differ.
    pub fn register(registry: &Registry, worker: &str) -> prometheus::Result<Self> {
        let counter = |name: &str, help: &str| -> prometheus::Result<IntCounter> {
            let counter = IntCounter::with_opts(Opts::new(name, help).const_label("worker", worker))?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        Ok(Self {
            worker: worker.to_string(),
            records_processed: counter(
                "stream_records_processed_total",
                "Records applied by the handler and marked for commit",
            )?,
            record_failures: counter(
                "stream_record_failures_total",
                "Records whose handler failed and stopped the worker",
            )?,
            offset_commits: counter(
                "stream_offset_commits_total",
                "Successful offset commits, async and sync",
            )?,
            transport_errors: counter(
                "stream_transport_errors_total",
                "Poll errors retried after a backoff",
            )?,
        })
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }

    pub fn processed(&self) -> u64 {
        self.records_processed.get()
    }

    pub fn failures(&self) -> u64 {
        self.record_failures.get()
    }

    pub fn commits(&self) -> u64 {
        self.offset_commits.get()
    }

    pub fn transport_errors(&self) -> u64 {
        self.transport_errors.get()
    }

    pub(crate) fn record_processed(&self) {
        self.records_processed.inc();
    }

    pub(crate) fn record_failure(&self) {
        self.record_failures.inc();
    }

    pub(crate) fn offsets_committed(&self) {
        self.offset_commits.inc();
    }

    pub(crate) fn transport_error(&self) {
        self.transport_errors.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_value(registry: &Registry, name: &str, worker: &str) -> Option<f64> {
        registry
            .gather()
            .into_iter()
            .find(|family| family.get_name() == name)?
            .get_metric()
            .iter()
            .find(|m| {
                m.get_label()
                    .iter()
                    .any(|l| l.get_name() == "worker" && l.get_value() == worker)
            })
            .map(|m| m.get_counter().get_value())
    }

    #[test]
    fn test_workers_share_a_registry() {
        let registry = Registry::new();
        let actions = ConsumerMetrics::register(&registry, "action-projection").unwrap();
        let similarity = ConsumerMetrics::register(&registry, "similarity-projection").unwrap();

        actions.record_processed();
        actions.record_processed();
        similarity.transport_error();

        assert_eq!(actions.processed(), 2);
        assert_eq!(similarity.processed(), 0);
        assert_eq!(
            counter_value(&registry, "stream_records_processed_total", "action-projection"),
            Some(2.0)
        );
        assert_eq!(
            counter_value(&registry, "stream_transport_errors_total", "similarity-projection"),
            Some(1.0)
        );
    }

    #[test]
    fn test_duplicate_worker_name_rejected() {
        let registry = Registry::new();
        ConsumerMetrics::register(&registry, "aggregator").unwrap();
        assert!(ConsumerMetrics::register(&registry, "aggregator").is_err());
    }

    #[test]
    fn test_clones_share_counters() {
        let registry = Registry::new();
        let metrics = ConsumerMetrics::register(&registry, "aggregator").unwrap();
        let handle = metrics.clone();

        metrics.offsets_committed();
        assert_eq!(handle.commits(), 1);
    }
}
