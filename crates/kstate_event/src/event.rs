//! Raw trace events.
//!
//! An event carries a timestamp, a marker name selecting the state-transition
//! handler, the CPU it was recorded on, and an ordered field list.

use indexmap::IndexMap;
use kstate_core::{CpuId, TraceTime};
use serde::{Deserialize, Serialize};

/// A typed field value in a raw event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Unsigned integer field
    Unsigned(u64),
    /// Signed integer field
    Signed(i64),
    /// Text field
    Text(String),
}

impl FieldValue {
    /// Field as u64, if it is numeric
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Unsigned(v) => Some(*v),
            Self::Signed(v) => u64::try_from(*v).ok(),
            Self::Text(_) => None,
        }
    }

    /// Field as i64, if it is numeric
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Unsigned(v) => i64::try_from(*v).ok(),
            Self::Signed(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    /// Field as text, if it is textual
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// One raw trace event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Timestamp in nanoseconds
    pub timestamp: TraceTime,
    /// Marker name, e.g. `sched_schedule` or `syscall_entry`
    pub marker: String,
    /// CPU the event was recorded on
    pub cpu: CpuId,
    /// Ordered field key/value list
    pub fields: IndexMap<String, FieldValue>,
}

impl RawEvent {
    /// Create a new event with no fields
    #[must_use]
    pub fn new(timestamp: TraceTime, marker: impl Into<String>, cpu: CpuId) -> Self {
        Self {
            timestamp,
            marker: marker.into(),
            cpu,
            fields: IndexMap::new(),
        }
    }

    /// Attach a field, preserving insertion order
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Numeric field lookup
    #[must_use]
    pub fn field_u64(&self, name: &str) -> Option<u64> {
        self.fields.get(name).and_then(FieldValue::as_u64)
    }

    /// Signed numeric field lookup
    #[must_use]
    pub fn field_i64(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(FieldValue::as_i64)
    }

    /// Text field lookup
    #[must_use]
    pub fn field_text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(FieldValue::as_text)
    }
}
