//! kstate request layer
//!
//! Presents N independent traces as one chronologically ordered event stream
//! and manages asynchronous, cancellable, range-bounded delivery requests
//! over it. Each raw event is sequenced into before/update/after phases so
//! state mutation and caller notification stay strictly ordered.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod merge;
pub mod provider;
pub mod request;
pub mod synthetic;

pub use merge::EventMerger;
pub use provider::{EventProvider, RequestError};
pub use request::{RequestHandle, RequestListener, RequestSpec, RequestState};
pub use synthetic::{Phase, SyntheticEvent};
