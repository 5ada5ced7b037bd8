//! Synthetic events.
//!
//! Each raw event is wrapped into a phased synthetic event so notification
//! and mutation are strictly ordered: callers see `Before` with the prior
//! state, the model mutates during `Update`, callers see `After` with the
//! posterior state. `StartReq` opens a request once; `EndReq` closes it once
//! per trace, carrying that trace's final state snapshot.

use kstate_core::TraceId;
use kstate_event::RawEvent;
use kstate_model::StateModel;

/// Sequence indicator of a synthetic event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Request is starting; reset transient view state
    StartReq,
    /// Raw event about to be applied; state is the last known state
    Before,
    /// State mutation in progress (internal, never delivered)
    Update,
    /// Raw event applied; state reflects it
    After,
    /// Request finished for one trace; carries its final state
    EndReq,
}

/// A phased wrapper around one raw event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticEvent {
    /// Sequence indicator
    pub phase: Phase,
    /// Trace the wrapped event (or final state) belongs to
    pub trace_id: TraceId,
    /// The wrapped raw event, absent for `StartReq`/`EndReq`
    event: Option<RawEvent>,
    /// Final state snapshot, present only for `EndReq`
    final_state: Option<Box<StateModel>>,
}

impl SyntheticEvent {
    /// The once-per-request start marker
    #[must_use]
    pub fn start_req(trace_id: TraceId) -> Self {
        Self {
            phase: Phase::StartReq,
            trace_id,
            event: None,
            final_state: None,
        }
    }

    /// Pre-update wrapper for one raw event
    #[must_use]
    pub fn before(trace_id: TraceId, event: RawEvent) -> Self {
        Self {
            phase: Phase::Before,
            trace_id,
            event: Some(event),
            final_state: None,
        }
    }

    /// Post-update wrapper for one raw event
    #[must_use]
    pub fn after(trace_id: TraceId, event: RawEvent) -> Self {
        Self {
            phase: Phase::After,
            trace_id,
            event: Some(event),
            final_state: None,
        }
    }

    /// The once-per-trace end marker with the trace's final state
    #[must_use]
    pub fn end_req(trace_id: TraceId, state: StateModel) -> Self {
        Self {
            phase: Phase::EndReq,
            trace_id,
            event: None,
            final_state: Some(Box::new(state)),
        }
    }

    /// The wrapped raw event, if this phase carries one
    #[must_use]
    pub fn raw(&self) -> Option<&RawEvent> {
        self.event.as_ref()
    }

    /// The final state snapshot of an `EndReq`
    #[must_use]
    pub fn final_state(&self) -> Option<&StateModel> {
        self.final_state.as_deref()
    }
}
