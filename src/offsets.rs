//! Commit positions for concurrently processed messages.
//!
//! Messages from one partition finish out of order once they are spread
//! over several workers. A partition's commit position may only move up to
//! its oldest message still in flight, otherwise a crash would skip it.

use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
struct PartitionState {
    in_flight: BTreeSet<i64>,
    highest_seen: Option<i64>,
    /// Last position handed out, starting at the first offset seen.
    committed: Option<i64>,
}

impl PartitionState {
    /// Next offset to consume given what has finished so far.
    fn watermark(&self) -> Option<i64> {
        match self.in_flight.first() {
            Some(oldest) => Some(*oldest),
            None => self.highest_seen.map(|o| o + 1),
        }
    }
}

#[derive(Debug, Default)]
pub struct OffsetTracker {
    partitions: HashMap<(String, i32), PartitionState>,
}

impl OffsetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, topic: &str, partition: i32, offset: i64) {
        let state = self
            .partitions
            .entry((topic.to_string(), partition))
            .or_default();
        state.in_flight.insert(offset);
        state.committed.get_or_insert(offset);
        state.highest_seen = Some(state.highest_seen.map_or(offset, |h| h.max(offset)));
    }

    /// Marks `offset` done and returns the partition's new commit position
    /// if it moved forward.
    pub fn complete(&mut self, topic: &str, partition: i32, offset: i64) -> Option<i64> {
        let state = self.partitions.get_mut(&(topic.to_string(), partition))?;
        if !state.in_flight.remove(&offset) {
            return None;
        }

        let watermark = state.watermark()?;
        if state.committed.is_some_and(|c| c >= watermark) {
            return None;
        }
        state.committed = Some(watermark);
        Some(watermark)
    }

    pub fn in_flight(&self) -> usize {
        self.partitions.values().map(|s| s.in_flight.len()).sum()
    }
}
