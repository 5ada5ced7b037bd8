//! Time ranges.
//!
//! Ranges are closed on both ends: an event at exactly `end` is still inside.

use crate::time::TraceTime;
use serde::{Deserialize, Serialize};

/// A closed `[start, end]` range of trace time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    /// Range start, inclusive
    pub start: TraceTime,
    /// Range end, inclusive
    pub end: TraceTime,
}

impl TimeRange {
    /// Create a new range; `start` must not exceed `end`
    #[must_use]
    pub fn new(start: TraceTime, end: TraceTime) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// Whether `t` falls within the range
    #[must_use]
    pub fn contains(&self, t: TraceTime) -> bool {
        self.start <= t && t <= self.end
    }

    /// Smallest range covering both inputs
    #[must_use]
    pub fn union(&self, other: &TimeRange) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}
