//! Request specification, listener trait, and handles.

use kstate_core::{CoreError, TimeRange, TraceTime};
use kstate_model::StateModel;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

use crate::synthetic::SyntheticEvent;

/// Default number of delivered events between cancellation checks
pub const DEFAULT_BLOCK_SIZE: usize = 100;

/// Lifecycle state of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Queued, not yet picked up by a batch
    Armed,
    /// Delivery in progress
    Running,
    /// All in-range events delivered
    Completed,
    /// Stopped early at a block boundary after `cancel()`
    Cancelled,
    /// A source failed mid-stream
    Failed,
}

impl RequestState {
    /// Whether the request can no longer change state
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// What a request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestSpec {
    /// Time range to deliver, closed on both ends
    pub range: TimeRange,
    /// Suppress delivery before this instant while still updating state
    pub dispatch_offset: Option<TraceTime>,
    /// Stop after this many delivered events; 0 means unlimited
    pub max_events: usize,
    /// Delivered events between cancellation checks
    pub block_size: usize,
}

impl RequestSpec {
    /// Request everything inside `range`
    #[must_use]
    pub fn new(range: TimeRange) -> Self {
        Self {
            range,
            dispatch_offset: None,
            max_events: 0,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    /// Deliver only from `offset` onward; earlier events still update state
    #[must_use]
    pub fn with_dispatch_offset(mut self, offset: TraceTime) -> Self {
        self.dispatch_offset = Some(offset);
        self
    }

    /// Cap the number of delivered events
    #[must_use]
    pub fn with_max_events(mut self, max: usize) -> Self {
        self.max_events = max;
        self
    }

    /// Override the cancellation check granularity
    #[must_use]
    pub fn with_block_size(mut self, block: usize) -> Self {
        debug_assert!(block > 0);
        self.block_size = block;
        self
    }

    /// First instant from which events are actually delivered
    #[must_use]
    pub fn effective_offset(&self) -> TraceTime {
        match self.dispatch_offset {
            Some(offset) => offset.max(self.range.start),
            None => self.range.start,
        }
    }
}

/// Receives the synthetic event stream of one request
///
/// Callbacks run on the batch execution thread; keep them short. The state
/// reference passed to `on_data` is the live model for `Before`/`After`
/// phases and the final snapshot for `EndReq`.
pub trait RequestListener: Send {
    /// Delivery is about to begin
    fn on_started(&mut self) {}

    /// One synthetic event with the state it was observed against
    fn on_data(&mut self, event: &SyntheticEvent, state: &StateModel);

    /// All in-range events were delivered
    fn on_completed(&mut self) {}

    /// The request stopped at a block boundary after cancellation
    fn on_cancelled(&mut self) {}

    /// A source failed mid-stream
    fn on_failed(&mut self, _error: &CoreError) {}
}

struct HandleInner {
    state: Mutex<RequestState>,
    cancel_flag: AtomicBool,
    delivered: AtomicUsize,
    done: watch::Sender<bool>,
}

/// Shared handle to an in-flight request
///
/// Cloneable and thread-safe; the execution side drives state transitions
/// while callers observe, cancel, and await completion.
#[derive(Clone)]
pub struct RequestHandle {
    inner: Arc<HandleInner>,
}

impl RequestHandle {
    pub(crate) fn new() -> Self {
        let (done, _) = watch::channel(false);
        Self {
            inner: Arc::new(HandleInner {
                state: Mutex::new(RequestState::Armed),
                cancel_flag: AtomicBool::new(false),
                delivered: AtomicUsize::new(0),
                done,
            }),
        }
    }

    /// Ask the request to stop at the next block boundary
    ///
    /// Idempotent; has no effect once the request is terminal.
    pub fn cancel(&self) {
        self.inner.cancel_flag.store(true, Ordering::SeqCst);
    }

    /// Whether the request actually terminated as cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.state_guard() == RequestState::Cancelled
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> RequestState {
        *self.state_guard()
    }

    /// Events delivered so far, counted at the `After` phase
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.inner.delivered.load(Ordering::SeqCst)
    }

    /// Wait until the request reaches a terminal state
    pub async fn wait_for_completion(&self) {
        let mut rx = self.inner.done.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub(crate) fn mark_running(&self) {
        let mut state = self.state_guard();
        if *state == RequestState::Armed {
            *state = RequestState::Running;
        }
    }

    /// Move to a terminal state; returns false if already terminal
    pub(crate) fn finish(&self, terminal: RequestState) -> bool {
        debug_assert!(terminal.is_terminal());
        {
            let mut state = self.state_guard();
            if state.is_terminal() {
                return false;
            }
            *state = terminal;
        }
        // send_replace stores the value even when no receiver subscribed yet
        self.inner.done.send_replace(true);
        true
    }

    pub(crate) fn add_delivered(&self) -> usize {
        self.inner.delivered.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn cancel_requested(&self) -> bool {
        self.inner.cancel_flag.load(Ordering::SeqCst)
    }

    fn state_guard(&self) -> MutexGuard<'_, RequestState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
