//! Trace sources and cursors.
//!
//! A `TraceSource` is the engine-facing view of one trace file: bounds, CPU
//! count, and seekable sequential cursors. The real reader lives outside this
//! workspace; `MemoryTraceSource` is the in-memory implementation used by
//! tests and embedders that already hold decoded events.

use crate::event::RawEvent;
use kstate_core::{CoreResult, TraceTime};
use std::sync::Arc;

/// Sequential event cursor over one trace
pub trait EventCursor: Send {
    /// Next event in timestamp order, `None` at end of trace
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read breaks mid-stream.
    fn next(&mut self) -> CoreResult<Option<RawEvent>>;
}

/// One trace file as seen by the engine
pub trait TraceSource: Send + Sync {
    /// Timestamp of the first event
    fn start_time(&self) -> TraceTime;

    /// Timestamp of the last event
    fn end_time(&self) -> TraceTime;

    /// Declared CPU count of the traced system
    fn num_cpus(&self) -> usize;

    /// Cursor positioned at the first event with `timestamp >= at`
    fn cursor_at(&self, at: TraceTime) -> Box<dyn EventCursor>;
}

/// In-memory trace source over a pre-sorted event vector
pub struct MemoryTraceSource {
    events: Arc<Vec<RawEvent>>,
    num_cpus: usize,
}

impl MemoryTraceSource {
    /// Create a source from decoded events; sorts by timestamp if needed
    #[must_use]
    pub fn new(mut events: Vec<RawEvent>, num_cpus: usize) -> Self {
        if !events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp) {
            events.sort_by_key(|e| e.timestamp);
        }
        Self {
            events: Arc::new(events),
            num_cpus,
        }
    }

    /// Total number of events in the trace
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the trace holds no events
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl TraceSource for MemoryTraceSource {
    fn start_time(&self) -> TraceTime {
        self.events.first().map_or(TraceTime::zero(), |e| e.timestamp)
    }

    fn end_time(&self) -> TraceTime {
        self.events.last().map_or(TraceTime::zero(), |e| e.timestamp)
    }

    fn num_cpus(&self) -> usize {
        self.num_cpus
    }

    fn cursor_at(&self, at: TraceTime) -> Box<dyn EventCursor> {
        let position = self.events.partition_point(|e| e.timestamp < at);
        Box::new(MemoryCursor {
            events: Arc::clone(&self.events),
            position,
        })
    }
}

/// Cursor over an in-memory event vector
struct MemoryCursor {
    events: Arc<Vec<RawEvent>>,
    position: usize,
}

impl EventCursor for MemoryCursor {
    fn next(&mut self) -> CoreResult<Option<RawEvent>> {
        match self.events.get(self.position) {
            Some(event) => {
                self.position += 1;
                Ok(Some(event.clone()))
            }
            None => Ok(None),
        }
    }
}
