//! Trace time.
//!
//! All trace timestamps are nanoseconds since the trace clock origin.
//! Ordering on `TraceTime` is the ordering of the replayed event stream.

use serde::{Deserialize, Serialize};

/// A trace timestamp in nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TraceTime(i64);

impl TraceTime {
    /// The earliest representable timestamp
    pub const MIN: Self = Self(i64::MIN);

    /// The latest representable timestamp
    pub const MAX: Self = Self(i64::MAX);

    /// Timestamp at the trace clock origin
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Create from raw nanoseconds
    #[must_use]
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Raw nanosecond value
    #[must_use]
    pub const fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Saturating addition of a nanosecond delta
    #[must_use]
    pub const fn saturating_add(&self, nanos: i64) -> Self {
        Self(self.0.saturating_add(nanos))
    }
}

impl Default for TraceTime {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for TraceTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secs = self.0 / 1_000_000_000;
        let nanos = (self.0 % 1_000_000_000).unsigned_abs();
        write!(f, "{}.{:09}", secs, nanos)
    }
}

impl From<i64> for TraceTime {
    fn from(nanos: i64) -> Self {
        Self(nanos)
    }
}
