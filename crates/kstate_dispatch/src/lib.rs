//! kstate event dispatch
//!
//! Routes each raw trace event to the state-transition handler selected by
//! its marker name. Handlers are pure functions of (event, prior state):
//! replaying the same events against equal states always produces equal
//! states, which is what checkpoint/replay correctness rests on.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dispatch;
pub mod marker;

pub use dispatch::EventDispatcher;
pub use marker::MarkerKind;
