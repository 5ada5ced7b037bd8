//! The experiment-wide event provider.
//!
//! Owns one state manager per trace and serves time-range requests over the
//! merged stream. Requests queue until `execute_pending` drains them; all
//! queued requests coalesce into a single batch that replays the union of
//! their ranges once, so N overlapping requests cost one pass.

use kstate_core::{CoreError, CoreResult, TimeRange, TraceId, TraceTime};
use kstate_dispatch::EventDispatcher;
use kstate_event::{EventCursor, TraceSource};
use kstate_manager::{CheckpointConfig, ManagerError, TraceStateManager};
use kstate_model::{NameTables, StateModel};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::merge::EventMerger;
use crate::request::{RequestHandle, RequestListener, RequestSpec, RequestState};
use crate::synthetic::SyntheticEvent;

/// Provider construction and lookup errors
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Constructed without any trace sources
    #[error("experiment has no traces")]
    EmptyExperiment,

    /// A per-trace manager failed to initialize
    #[error(transparent)]
    Manager(#[from] ManagerError),
}

impl From<RequestError> for CoreError {
    fn from(err: RequestError) -> Self {
        CoreError::StateInit {
            reason: err.to_string(),
        }
    }
}

struct ExperimentTrace {
    id: TraceId,
    manager: TraceStateManager,
}

struct PendingRequest {
    spec: RequestSpec,
    listener: Box<dyn RequestListener>,
    handle: RequestHandle,
}

struct ProviderInner {
    traces: Vec<ExperimentTrace>,
    pending: Mutex<Vec<PendingRequest>>,
    // Batches seek and mutate the shared live models; only one may run.
    batch_lock: tokio::sync::Mutex<()>,
}

/// Serves synthetic event streams over a multi-trace experiment
///
/// Cheaply cloneable; clones share the same traces and request queue.
#[derive(Clone)]
pub struct EventProvider {
    inner: Arc<ProviderInner>,
}

impl EventProvider {
    /// Build a provider over `sources`, one manager per trace
    ///
    /// Traces are numbered by position. Every manager's seekable bound is
    /// extended to the latest end time across the experiment, so a request
    /// inside any trace's range is valid against all of them.
    ///
    /// # Errors
    ///
    /// Returns `RequestError::EmptyExperiment` for an empty source list and
    /// propagates manager initialization failures.
    pub fn new(
        sources: Vec<Arc<dyn TraceSource>>,
        tables: NameTables,
        config: CheckpointConfig,
    ) -> Result<Self, RequestError> {
        if sources.is_empty() {
            return Err(RequestError::EmptyExperiment);
        }
        let experiment_end = sources
            .iter()
            .map(|s| s.end_time())
            .max()
            .unwrap_or(TraceTime::zero());

        let mut traces = Vec::with_capacity(sources.len());
        for (n, source) in sources.into_iter().enumerate() {
            let id = TraceId::new(n as u32);
            let manager =
                TraceStateManager::new(id, Some(source), tables.clone(), config)?
                    .with_experiment_end(experiment_end);
            traces.push(ExperimentTrace { id, manager });
        }

        Ok(Self {
            inner: Arc::new(ProviderInner {
                traces,
                pending: Mutex::new(Vec::new()),
                batch_lock: tokio::sync::Mutex::new(()),
            }),
        })
    }

    /// Number of traces in the experiment
    #[must_use]
    pub fn num_traces(&self) -> usize {
        self.inner.traces.len()
    }

    /// Ids of all traces, in merge order
    #[must_use]
    pub fn trace_ids(&self) -> Vec<TraceId> {
        self.inner.traces.iter().map(|t| t.id).collect()
    }

    /// Earliest start to latest end across all traces
    #[must_use]
    pub fn experiment_range(&self) -> TimeRange {
        let start = self
            .inner
            .traces
            .iter()
            .map(|t| t.manager.start_time())
            .min()
            .unwrap_or(TraceTime::zero());
        let end = self
            .inner
            .traces
            .iter()
            .map(|t| t.manager.end_time())
            .max()
            .unwrap_or(TraceTime::zero());
        TimeRange::new(start, end)
    }

    /// Queue a time-range request
    ///
    /// Nothing runs until `execute_pending`; the returned handle observes,
    /// cancels, and awaits the request from any thread.
    pub fn request_time_range(
        &self,
        spec: RequestSpec,
        listener: Box<dyn RequestListener>,
    ) -> RequestHandle {
        let handle = RequestHandle::new();
        lock(&self.inner.pending).push(PendingRequest {
            spec,
            listener,
            handle: handle.clone(),
        });
        tracing::debug!(range = %spec.range, "time range request queued");
        handle
    }

    /// Drain the queue and run all pending requests as one coalesced batch
    ///
    /// The batch replays the union of the pending ranges on a blocking
    /// worker thread; each request only sees events inside its own range.
    /// Batches run one at a time: a concurrent call waits for the running
    /// batch to finish, then drains whatever queued in the meantime.
    ///
    /// # Errors
    ///
    /// Returns the source failure that stopped the batch; every affected
    /// request is marked failed and notified before the error propagates.
    pub async fn execute_pending(&self) -> CoreResult<()> {
        let _serial = self.inner.batch_lock.lock().await;
        let batch: Vec<PendingRequest> = {
            let mut pending = lock(&self.inner.pending);
            pending.drain(..).collect()
        };
        if batch.is_empty() {
            return Ok(());
        }

        let union = batch
            .iter()
            .skip(1)
            .fold(batch[0].spec.range, |acc, p| acc.union(&p.spec.range));
        tracing::debug!(requests = batch.len(), range = %union, "executing batch");

        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || run_batch(&inner, batch, union))
            .await
            .map_err(|e| CoreError::Internal {
                message: e.to_string(),
            })?
    }

    /// Full forward pass over one trace, building its checkpoint index
    ///
    /// Returns the total number of events consumed by the checkpoint side.
    /// Re-indexing an already indexed trace requires `clear_checkpoints`
    /// first, otherwise the forward counter keeps accumulating.
    ///
    /// # Errors
    ///
    /// Returns `TraceNotFound` for an unknown id and propagates read errors.
    pub fn index_trace(&self, trace_id: TraceId) -> CoreResult<u64> {
        let trace = self.trace(trace_id)?;
        let mut cursor: Box<dyn EventCursor> =
            trace.manager.source().cursor_at(TraceTime::MIN);
        while let Some(event) = cursor.next()? {
            trace.manager.advance_forward(&event);
        }
        let count = trace.manager.forward_counter();
        tracing::debug!(
            trace = %trace_id,
            events = count,
            checkpoints = trace.manager.checkpoint_count(),
            "trace indexed"
        );
        Ok(count)
    }

    /// Deep copy of one trace's live model
    ///
    /// # Errors
    ///
    /// Returns `TraceNotFound` for an unknown id.
    pub fn state_model(&self, trace_id: TraceId) -> CoreResult<StateModel> {
        Ok(self.trace(trace_id)?.manager.live_snapshot())
    }

    /// Checkpoints currently held for one trace
    ///
    /// # Errors
    ///
    /// Returns `TraceNotFound` for an unknown id.
    pub fn checkpoint_count(&self, trace_id: TraceId) -> CoreResult<usize> {
        Ok(self.trace(trace_id)?.manager.checkpoint_count())
    }

    /// Drop one trace's checkpoints and reset its forward pass
    ///
    /// # Errors
    ///
    /// Returns `TraceNotFound` for an unknown id.
    pub fn clear_checkpoints(&self, trace_id: TraceId) -> CoreResult<()> {
        self.trace(trace_id)?.manager.clear_checkpoints();
        Ok(())
    }

    fn trace(&self, trace_id: TraceId) -> CoreResult<&ExperimentTrace> {
        self.inner
            .traces
            .iter()
            .find(|t| t.id == trace_id)
            .ok_or(CoreError::TraceNotFound {
                trace_id: trace_id.as_u32(),
            })
    }
}

struct Subscription {
    spec: RequestSpec,
    listener: Box<dyn RequestListener>,
    handle: RequestHandle,
    finished: bool,
}

impl Subscription {
    fn wants(&self, t: TraceTime) -> bool {
        if self.finished || t < self.spec.effective_offset() || !self.spec.range.contains(t) {
            return false;
        }
        self.spec.max_events == 0 || self.handle.delivered() < self.spec.max_events
    }
}

/// Replay the union range once and fan events out to every subscription
fn run_batch(
    inner: &ProviderInner,
    pending: Vec<PendingRequest>,
    union: TimeRange,
) -> CoreResult<()> {
    let mut subs: Vec<Subscription> = pending
        .into_iter()
        .map(|p| Subscription {
            spec: p.spec,
            listener: p.listener,
            handle: p.handle,
            finished: false,
        })
        .collect();

    // Position every trace at the nearest checkpoint at or before the union
    // start. Forward replay from there to the range updates state without
    // delivery, because no subscription's range contains those timestamps.
    let mut cursors: Vec<Box<dyn EventCursor>> = Vec::with_capacity(inner.traces.len());
    for trace in &inner.traces {
        let cursor = match trace.manager.restore_checkpoint_by_timestamp(union.start) {
            Some(restored) => match trace.manager.resume_cursor(&restored) {
                Ok(cursor) => cursor,
                Err(err) => return fail_all(&mut subs, err),
            },
            None => trace.manager.source().cursor_at(TraceTime::MAX),
        };
        cursors.push(cursor);
    }
    let mut dispatchers: Vec<EventDispatcher> = inner
        .traces
        .iter()
        .map(|_| EventDispatcher::new())
        .collect();

    // One start marker per request, against the first trace's restored state
    let first = &inner.traces[0];
    let start_event = SyntheticEvent::start_req(first.id);
    let snapshot = first.manager.live_snapshot();
    for sub in &mut subs {
        sub.handle.mark_running();
        sub.listener.on_started();
        sub.listener.on_data(&start_event, &snapshot);
    }
    drop(snapshot);

    // Priming the merger already reads each source once; a failure here must
    // close the requests out the same way a mid-stream failure does.
    let mut merger = match EventMerger::new(cursors) {
        Ok(merger) => merger,
        Err(err) => return fail_all(&mut subs, err),
    };
    loop {
        let step = match merger.next() {
            Ok(step) => step,
            Err(err) => return fail_all(&mut subs, err),
        };
        let Some((source, event)) = step else { break };
        let t = event.timestamp;
        if t > union.end {
            break;
        }
        let trace = &inner.traces[source];

        let wants: Vec<bool> = subs.iter().map(|s| s.wants(t)).collect();
        let any_delivery = wants.iter().any(|&w| w);

        if any_delivery {
            let before = SyntheticEvent::before(trace.id, event.clone());
            trace.manager.with_live(|state| {
                for (sub, &wanted) in subs.iter_mut().zip(&wants) {
                    if wanted {
                        sub.listener.on_data(&before, state);
                    }
                }
            });
        }

        // The update phase is internal; delivery resumes with `After`
        trace.manager.process_live(&mut dispatchers[source], &event);

        let mut counts: Vec<Option<usize>> = vec![None; subs.len()];
        if any_delivery {
            let after = SyntheticEvent::after(trace.id, event.clone());
            trace.manager.with_live(|state| {
                for (n, (sub, &wanted)) in subs.iter_mut().zip(&wants).enumerate() {
                    if wanted {
                        sub.listener.on_data(&after, state);
                        counts[n] = Some(sub.handle.add_delivered());
                    }
                }
            });
        }

        // Terminal checks run outside the live locks
        for (n, sub) in subs.iter_mut().enumerate() {
            if sub.finished {
                continue;
            }
            if let Some(count) = counts[n] {
                if count % sub.spec.block_size == 0 && sub.handle.cancel_requested() {
                    close_cancelled(sub);
                    continue;
                }
                if sub.spec.max_events > 0 && count >= sub.spec.max_events {
                    close_completed(sub, &inner.traces);
                    continue;
                }
            }
            if t > sub.spec.range.end {
                close_completed(sub, &inner.traces);
            }
        }
        if subs.iter().all(|s| s.finished) {
            break;
        }
    }

    for sub in subs.iter_mut().filter(|s| !s.finished) {
        close_completed(sub, &inner.traces);
    }
    Ok(())
}

/// End markers carry each trace's final live state, then the request closes
fn close_completed(sub: &mut Subscription, traces: &[ExperimentTrace]) {
    for trace in traces {
        let end = SyntheticEvent::end_req(trace.id, trace.manager.live_snapshot());
        if let Some(state) = end.final_state() {
            sub.listener.on_data(&end, state);
        }
    }
    sub.finished = true;
    sub.handle.finish(RequestState::Completed);
    sub.listener.on_completed();
}

/// Mark every unfinished request failed, notify it, and propagate the error
fn fail_all(subs: &mut [Subscription], err: CoreError) -> CoreResult<()> {
    for sub in subs.iter_mut().filter(|s| !s.finished) {
        sub.listener.on_failed(&err);
        sub.handle.finish(RequestState::Failed);
        sub.finished = true;
    }
    tracing::warn!(error = %err, "batch failed");
    Err(err)
}

fn close_cancelled(sub: &mut Subscription) {
    sub.finished = true;
    sub.handle.finish(RequestState::Cancelled);
    sub.listener.on_cancelled();
    tracing::debug!(
        delivered = sub.handle.delivered(),
        "request cancelled at block boundary"
    );
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
