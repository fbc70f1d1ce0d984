use crate::error::ConsumerResult;
use crate::metrics::ConsumerMetrics;
use crate::offsets::OffsetTracker;
use crate::{CommitMode, ConsumerPhase, RecordHandler, RecordSource};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Poll loop tuning
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Upper bound on a single blocking poll
    pub poll_timeout: Duration,
    /// Commit asynchronously after this many applied records (0 = drain only)
    pub commit_every: usize,
    /// Pause after a transport error before polling again
    pub transport_backoff: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(1000),
            commit_every: 10,
            transport_backoff: Duration::from_secs(1),
        }
    }
}

/// Drives one [`RecordHandler`] from one [`RecordSource`], strictly one
/// record at a time.
pub struct StreamWorker<S, H> {
    metrics: ConsumerMetrics,
    source: S,
    handler: H,
    settings: WorkerSettings,
    offsets: OffsetTracker,
    phase_tx: watch::Sender<ConsumerPhase>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<S, H> StreamWorker<S, H>
where
    S: RecordSource,
    H: RecordHandler,
{
    /// The worker logs under `metrics.worker()`.
    pub fn new(
        metrics: ConsumerMetrics,
        source: S,
        handler: H,
        settings: WorkerSettings,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let (phase_tx, _) = watch::channel(ConsumerPhase::Init);
        Self {
            metrics,
            source,
            handler,
            offsets: OffsetTracker::new(settings.commit_every),
            settings,
            phase_tx,
            shutdown_rx,
        }
    }

    /// Subscribe to phase transitions (used by readiness probes).
    pub fn phase(&self) -> watch::Receiver<ConsumerPhase> {
        self.phase_tx.subscribe()
    }

    /// Run until shutdown or a fatal handler error, then drain and close.
    ///
    /// Returns the handler error if the loop stopped because of one; offsets
    /// of records applied before the failure are still committed.
    pub async fn run(mut self) -> ConsumerResult<()> {
        info!(worker = %self.metrics.worker(), "Starting stream worker");

        if let Err(e) = self.source.subscribe().await {
            error!(worker = %self.metrics.worker(), error = %e, "Subscribe failed");
            self.set_phase(ConsumerPhase::Closed);
            return Err(e);
        }
        self.set_phase(ConsumerPhase::Subscribed);
        self.set_phase(ConsumerPhase::Polling);

        let outcome = self.poll_loop().await;

        self.set_phase(ConsumerPhase::Draining);
        self.drain().await;
        self.source.close();
        self.set_phase(ConsumerPhase::Closed);

        info!(
            worker = %self.metrics.worker(),
            processed = self.metrics.processed(),
            commits = self.metrics.commits(),
            transport_errors = self.metrics.transport_errors(),
            "Stream worker closed"
        );

        outcome
    }

    async fn poll_loop(&mut self) -> ConsumerResult<()> {
        loop {
            if *self.shutdown_rx.borrow() {
                info!(worker = %self.metrics.worker(), "Shutdown requested, leaving poll loop");
                return Ok(());
            }

            tokio::select! {
                biased;

                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!(worker = %self.metrics.worker(), "Shutdown signal received, leaving poll loop");
                        return Ok(());
                    }
                }

                polled = self.source.poll(self.settings.poll_timeout) => {
                    match polled {
                        Ok(Some(record)) => {
                            if let Err(e) = self.handler.handle(&record).await {
                                self.metrics.record_failure();
                                error!(
                                    worker = %self.metrics.worker(),
                                    topic = %record.topic,
                                    partition = record.partition,
                                    offset = record.offset,
                                    error = %e,
                                    "Fatal record failure, stopping consumer"
                                );
                                return Err(e);
                            }

                            self.offsets.mark(&record.topic, record.partition, record.offset);
                            self.metrics.record_processed();

                            if self.offsets.should_commit() {
                                self.commit(CommitMode::Async);
                            }
                        }
                        Ok(None) => {
                            // Poll timeout, nothing to read
                        }
                        Err(e) if e.is_transient() => {
                            self.metrics.transport_error();
                            warn!(worker = %self.metrics.worker(), error = %e, "Poll failed, retrying");
                            tokio::time::sleep(self.settings.transport_backoff).await;
                        }
                        Err(e) => {
                            error!(worker = %self.metrics.worker(), error = %e, "Consumer failure, stopping");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    async fn drain(&mut self) {
        debug!(worker = %self.metrics.worker(), "Draining");

        if let Err(e) = self.handler.drain().await {
            warn!(worker = %self.metrics.worker(), error = %e, "Handler drain failed");
        }

        self.commit(CommitMode::Sync);
    }

    fn commit(&mut self, mode: CommitMode) {
        if !self.offsets.has_pending() {
            return;
        }

        let snapshot = self.offsets.snapshot();
        match self.source.commit(&snapshot, mode) {
            Ok(()) => {
                self.offsets.mark_committed();
                self.metrics.offsets_committed();
                debug!(worker = %self.metrics.worker(), ?mode, offsets = ?snapshot, "Committed offsets");
            }
            Err(e) => {
                warn!(worker = %self.metrics.worker(), ?mode, error = %e, "Failed to commit offsets");
            }
        }
    }

    fn set_phase(&self, phase: ConsumerPhase) {
        debug!(worker = %self.metrics.worker(), %phase, "Phase transition");
        self.phase_tx.send_replace(phase);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConsumerError;
    use crate::offsets::PartitionOffset;
    use crate::ConsumedRecord;
    use async_trait::async_trait;
    use prometheus::Registry;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    enum Step {
        Record(ConsumedRecord),
        TransportError,
    }

    /// Replays scripted steps, then requests shutdown once exhausted.
    struct ScriptedSource {
        steps: VecDeque<Step>,
        commits: Arc<Mutex<Vec<(CommitMode, Vec<PartitionOffset>)>>>,
        shutdown_tx: watch::Sender<bool>,
        closed: Arc<Mutex<bool>>,
    }

    #[async_trait]
    impl RecordSource for ScriptedSource {
        async fn subscribe(&mut self) -> ConsumerResult<()> {
            Ok(())
        }

        async fn poll(&mut self, _timeout: Duration) -> ConsumerResult<Option<ConsumedRecord>> {
            match self.steps.pop_front() {
                Some(Step::Record(record)) => Ok(Some(record)),
                Some(Step::TransportError) => {
                    Err(ConsumerError::Transport("broker unavailable".to_string()))
                }
                None => {
                    self.shutdown_tx.send_replace(true);
                    Ok(None)
                }
            }
        }

        fn commit(&mut self, offsets: &[PartitionOffset], mode: CommitMode) -> ConsumerResult<()> {
            self.commits.lock().unwrap().push((mode, offsets.to_vec()));
            Ok(())
        }

        fn close(&mut self) {
            *self.closed.lock().unwrap() = true;
        }
    }

    struct RecordingHandler {
        seen: Arc<Mutex<Vec<i64>>>,
        fail_at: Option<i64>,
        drained: Arc<Mutex<bool>>,
    }

    #[async_trait]
    impl RecordHandler for RecordingHandler {
        async fn handle(&mut self, record: &ConsumedRecord) -> ConsumerResult<()> {
            if Some(record.offset) == self.fail_at {
                return Err(record.decode_error("not json"));
            }
            self.seen.lock().unwrap().push(record.offset);
            Ok(())
        }

        async fn drain(&mut self) -> ConsumerResult<()> {
            *self.drained.lock().unwrap() = true;
            Ok(())
        }
    }

    fn record(offset: i64) -> Step {
        Step::Record(ConsumedRecord {
            topic: "actions".to_string(),
            partition: 0,
            offset,
            key: None,
            payload: Some(b"{}".to_vec()),
        })
    }

    struct Harness {
        worker: StreamWorker<ScriptedSource, RecordingHandler>,
        seen: Arc<Mutex<Vec<i64>>>,
        commits: Arc<Mutex<Vec<(CommitMode, Vec<PartitionOffset>)>>>,
        drained: Arc<Mutex<bool>>,
        closed: Arc<Mutex<bool>>,
        metrics: ConsumerMetrics,
    }

    fn settings(commit_every: usize) -> WorkerSettings {
        WorkerSettings {
            poll_timeout: Duration::from_millis(10),
            commit_every,
            transport_backoff: Duration::from_millis(1),
        }
    }

    fn harness(steps: Vec<Step>, commit_every: usize, fail_at: Option<i64>) -> Harness {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let commits = Arc::new(Mutex::new(Vec::new()));
        let drained = Arc::new(Mutex::new(false));
        let closed = Arc::new(Mutex::new(false));

        let source = ScriptedSource {
            steps: steps.into(),
            commits: commits.clone(),
            shutdown_tx,
            closed: closed.clone(),
        };
        let handler = RecordingHandler {
            seen: seen.clone(),
            fail_at,
            drained: drained.clone(),
        };
        let metrics = ConsumerMetrics::register(&Registry::new(), "test").unwrap();

        Harness {
            worker: StreamWorker::new(
                metrics.clone(),
                source,
                handler,
                settings(commit_every),
                shutdown_rx,
            ),
            seen,
            commits,
            drained,
            closed,
            metrics,
        }
    }

    #[tokio::test]
    async fn test_records_applied_in_order_and_committed_in_batches() {
        let h = harness((0..5).map(record).collect(), 2, None);
        let phase = h.worker.phase();

        h.worker.run().await.unwrap();

        assert_eq!(*h.seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(h.metrics.processed(), 5);
        assert_eq!(h.metrics.commits(), 3);

        let commits = h.commits.lock().unwrap();
        let modes: Vec<CommitMode> = commits.iter().map(|(mode, _)| *mode).collect();
        assert_eq!(
            modes,
            vec![CommitMode::Async, CommitMode::Async, CommitMode::Sync]
        );
        assert_eq!(commits[0].1[0].next_offset, 2);
        assert_eq!(commits[1].1[0].next_offset, 4);
        assert_eq!(commits[2].1[0].next_offset, 5);

        assert!(*h.drained.lock().unwrap());
        assert!(*h.closed.lock().unwrap());
        assert_eq!(*phase.borrow(), ConsumerPhase::Closed);
    }

    #[tokio::test]
    async fn test_zero_commit_batch_commits_only_on_drain() {
        let h = harness((0..5).map(record).collect(), 0, None);

        h.worker.run().await.unwrap();

        let commits = h.commits.lock().unwrap();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].0, CommitMode::Sync);
        assert_eq!(commits[0].1[0].next_offset, 5);
    }

    #[tokio::test]
    async fn test_transport_errors_do_not_stop_the_loop() {
        let steps = vec![record(0), Step::TransportError, Step::TransportError, record(1)];
        let h = harness(steps, 10, None);

        h.worker.run().await.unwrap();

        assert_eq!(*h.seen.lock().unwrap(), vec![0, 1]);
        assert_eq!(h.metrics.transport_errors(), 2);
    }

    #[tokio::test]
    async fn test_fatal_record_stops_loop_but_commits_applied_offsets() {
        let steps = vec![record(0), record(1), record(2), record(3)];
        let h = harness(steps, 10, Some(2));

        let err = h.worker.run().await.unwrap_err();
        assert!(matches!(err, ConsumerError::Decode { offset: 2, .. }));

        assert_eq!(*h.seen.lock().unwrap(), vec![0, 1]);

        let commits = h.commits.lock().unwrap();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].0, CommitMode::Sync);
        // The failed record is not marked: next read resumes at it
        assert_eq!(commits[0].1[0].next_offset, 2);
        assert!(*h.drained.lock().unwrap());
        assert_eq!(h.metrics.processed(), 2);
        assert_eq!(h.metrics.failures(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_before_first_poll_drains_without_commit() {
        let h = harness(vec![record(0)], 10, None);
        let (tx, rx) = watch::channel(true);
        let mut worker = h.worker;
        worker.shutdown_rx = rx;

        worker.run().await.unwrap();
        drop(tx);

        assert_eq!(h.metrics.processed(), 0);
        assert!(h.seen.lock().unwrap().is_empty());
        assert!(h.commits.lock().unwrap().is_empty());
        assert!(*h.drained.lock().unwrap());
    }

    /// Never yields a record; a poll only ends when its future is dropped.
    struct IdleSource {
        closed: Arc<Mutex<bool>>,
    }

    #[async_trait]
    impl RecordSource for IdleSource {
        async fn subscribe(&mut self) -> ConsumerResult<()> {
            Ok(())
        }

        async fn poll(&mut self, _timeout: Duration) -> ConsumerResult<Option<ConsumedRecord>> {
            std::future::pending().await
        }

        fn commit(&mut self, _offsets: &[PartitionOffset], _mode: CommitMode) -> ConsumerResult<()> {
            Ok(())
        }

        fn close(&mut self) {
            *self.closed.lock().unwrap() = true;
        }
    }

    #[tokio::test]
    async fn test_shutdown_wakes_a_blocked_poll() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let closed = Arc::new(Mutex::new(false));
        let drained = Arc::new(Mutex::new(false));
        let handler = RecordingHandler {
            seen: Arc::new(Mutex::new(Vec::new())),
            fail_at: None,
            drained: drained.clone(),
        };
        let metrics = ConsumerMetrics::register(&Registry::new(), "idle").unwrap();
        let worker = StreamWorker::new(
            metrics,
            IdleSource {
                closed: closed.clone(),
            },
            handler,
            settings(10),
            shutdown_rx,
        );
        let mut phase = worker.phase();

        let task = tokio::spawn(worker.run());

        tokio::time::timeout(
            Duration::from_secs(5),
            phase.wait_for(|p| *p == ConsumerPhase::Polling),
        )
        .await
        .expect("worker never started polling")
        .unwrap();

        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("blocked poll was not interrupted by shutdown")
            .unwrap()
            .unwrap();

        assert_eq!(*phase.borrow(), ConsumerPhase::Closed);
        assert!(*drained.lock().unwrap());
        assert!(*closed.lock().unwrap());
    }
}
