//! Offset bookkeeping for manual commits

use std::collections::BTreeMap;

/// Position to commit for one topic partition.
///
/// `next_offset` is the offset of the next record to read, i.e. the last
/// fully processed offset plus one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionOffset {
    pub topic: String,
    pub partition: i32,
    pub next_offset: i64,
}

/// Tracks the last fully applied record per partition and decides when a
/// batched commit is due.
#[derive(Debug)]
pub struct OffsetTracker {
    next: BTreeMap<(String, i32), i64>,
    commit_every: usize,
    since_commit: usize,
    processed: u64,
    dirty: bool,
}

impl OffsetTracker {
    /// `commit_every == 0` disables batched commits; offsets are then only
    /// committed when the consumer drains.
    pub fn new(commit_every: usize) -> Self {
        Self {
            next: BTreeMap::new(),
            commit_every,
            since_commit: 0,
            processed: 0,
            dirty: false,
        }
    }

    /// Record that `offset` on `topic[partition]` has been fully applied.
    pub fn mark(&mut self, topic: &str, partition: i32, offset: i64) {
        let next_offset = offset + 1;
        let entry = self.next.entry((topic.to_string(), partition)).or_insert(next_offset);
        if next_offset > *entry {
            *entry = next_offset;
        }
        self.since_commit += 1;
        self.processed += 1;
        self.dirty = true;
    }

    pub fn should_commit(&self) -> bool {
        self.commit_every > 0 && self.since_commit >= self.commit_every
    }

    pub fn has_pending(&self) -> bool {
        self.dirty
    }

    pub fn snapshot(&self) -> Vec<PartitionOffset> {
        self.next
            .iter()
            .map(|((topic, partition), next_offset)| PartitionOffset {
                topic: topic.clone(),
                partition: *partition,
                next_offset: *next_offset,
            })
            .collect()
    }

    /// Call after the snapshot has been handed to the broker.
    pub fn mark_committed(&mut self) {
        self.since_commit = 0;
        self.dirty = false;
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_due_every_n_records() {
        let mut tracker = OffsetTracker::new(3);
        assert!(!tracker.has_pending());

        tracker.mark("actions", 0, 10);
        tracker.mark("actions", 0, 11);
        assert!(!tracker.should_commit());

        tracker.mark("actions", 1, 4);
        assert!(tracker.should_commit());

        tracker.mark_committed();
        assert!(!tracker.should_commit());
        assert!(!tracker.has_pending());
        assert_eq!(tracker.processed(), 3);
    }

    #[test]
    fn test_snapshot_holds_next_offset_per_partition() {
        let mut tracker = OffsetTracker::new(10);
        tracker.mark("actions", 0, 10);
        tracker.mark("actions", 0, 11);
        tracker.mark("actions", 2, 7);

        let snapshot = tracker.snapshot();
        assert_eq!(
            snapshot,
            vec![
                PartitionOffset {
                    topic: "actions".to_string(),
                    partition: 0,
                    next_offset: 12,
                },
                PartitionOffset {
                    topic: "actions".to_string(),
                    partition: 2,
                    next_offset: 8,
                },
            ]
        );
    }

    #[test]
    fn test_redelivered_record_does_not_move_offset_back() {
        let mut tracker = OffsetTracker::new(10);
        tracker.mark("actions", 0, 20);
        tracker.mark("actions", 0, 15);

        assert_eq!(tracker.snapshot()[0].next_offset, 21);
    }

    #[test]
    fn test_zero_disables_batched_commits() {
        let mut tracker = OffsetTracker::new(0);
        for offset in 0..100 {
            tracker.mark("actions", 0, offset);
        }
        assert!(!tracker.should_commit());
        assert!(tracker.has_pending());
    }
}
