//! kstate raw events
//!
//! Typed raw trace events as handed over by the (out-of-scope) trace reader,
//! plus the cursor/source traits the rest of the engine consumes them through.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod event;
pub mod source;

pub use event::{FieldValue, RawEvent};
pub use source::{EventCursor, MemoryTraceSource, TraceSource};
