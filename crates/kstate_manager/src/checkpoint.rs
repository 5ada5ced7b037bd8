//! Checkpoints and the checkpoint index.
//!
//! A checkpoint pairs an (event-count, timestamp) position with a deep-cloned
//! state snapshot. Checkpoints are appended in strictly increasing order and
//! never mutated, so lookup is a binary search over the timestamp column.

use kstate_core::TraceTime;
use kstate_model::StateModel;
use serde::{Deserialize, Serialize};

/// One saved state snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Events processed when the snapshot was taken
    pub event_count: u64,
    /// Timestamp of the last processed event
    pub timestamp: TraceTime,
    /// How many of the processed events share `timestamp`
    ///
    /// Sources may legitimately report tied timestamps, and a checkpoint can
    /// land mid-tie. Replay after a restore seeks to `timestamp` and skips
    /// exactly this many events, so ties straddling the checkpoint are
    /// neither lost nor replayed twice.
    pub tied_events: u64,
    /// Deep-cloned state at that position
    pub state: StateModel,
}

impl Checkpoint {
    /// Create a checkpoint from a snapshot
    #[must_use]
    pub fn new(
        event_count: u64,
        timestamp: TraceTime,
        tied_events: u64,
        state: StateModel,
    ) -> Self {
        Self {
            event_count,
            timestamp,
            tied_events,
            state,
        }
    }
}

/// Position of a checkpoint the live model was restored from
///
/// Forward replay resumes by seeking the source to `timestamp` and skipping
/// the first `tied_events` events there; everything the cursor yields after
/// that is not yet in the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestorePoint {
    /// Timestamp of the restored checkpoint
    pub timestamp: TraceTime,
    /// Events included in the restored snapshot
    pub event_count: u64,
    /// Events at `timestamp` already included in the snapshot
    pub tied_events: u64,
}

/// Append-only, timestamp-sorted list of checkpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointIndex {
    checkpoints: Vec<Checkpoint>,
}

impl CheckpointIndex {
    /// Create an index holding only the zero checkpoint
    #[must_use]
    pub fn new(zero: Checkpoint) -> Self {
        Self {
            checkpoints: vec![zero],
        }
    }

    /// Append a checkpoint; positions must be strictly increasing
    pub fn push(&mut self, checkpoint: Checkpoint) {
        debug_assert!(self.checkpoints.last().map_or(true, |last| {
            last.event_count < checkpoint.event_count && last.timestamp <= checkpoint.timestamp
        }));
        self.checkpoints.push(checkpoint);
    }

    /// Greatest checkpoint with `timestamp <= target`
    ///
    /// Targets before the first checkpoint clamp to the zero checkpoint.
    #[must_use]
    pub fn lookup(&self, target: TraceTime) -> &Checkpoint {
        let position = self
            .checkpoints
            .partition_point(|c| c.timestamp <= target);
        // position 0 means target precedes the zero checkpoint; clamp
        let index = position.saturating_sub(1);
        &self.checkpoints[index]
    }

    /// Number of checkpoints, including the zero checkpoint
    #[must_use]
    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    /// An index is never empty, but clippy wants the pair
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    /// Discard everything but a new zero checkpoint
    pub fn reset(&mut self, zero: Checkpoint) {
        self.checkpoints.clear();
        self.checkpoints.push(zero);
    }
}
