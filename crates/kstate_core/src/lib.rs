//! kstate core types
//!
//! Nanosecond trace timestamps, time ranges, resource ids, and the shared
//! error taxonomy used by every other kstate crate.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod id;
pub mod range;
pub mod time;

pub use error::{CoreError, CoreResult};
pub use id::{CpuId, Pid, TraceId};
pub use range::TimeRange;
pub use time::TraceTime;
