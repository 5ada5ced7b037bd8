//! The per-trace state manager.

use crate::checkpoint::{Checkpoint, CheckpointIndex, RestorePoint};
use crate::config::CheckpointConfig;
use kstate_core::{CoreError, CoreResult, TraceId, TraceTime};
use kstate_dispatch::EventDispatcher;
use kstate_event::{EventCursor, RawEvent, TraceSource};
use kstate_model::{InitContext, NameTables, StateModel};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Trace state manager errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManagerError {
    /// Constructed without an underlying trace
    #[error("no trace source attached")]
    MissingTrace,

    /// State model initialization failed
    #[error("state initialization failed: {0}")]
    Init(String),
}

impl From<ManagerError> for CoreError {
    fn from(err: ManagerError) -> Self {
        CoreError::StateInit {
            reason: err.to_string(),
        }
    }
}

/// The strictly-forward checkpoint-building side of a manager
struct ForwardState {
    model: StateModel,
    dispatcher: EventDispatcher,
    counter: u64,
    /// Timestamp of the most recently consumed event
    last_timestamp: TraceTime,
    /// Consecutive events seen at `last_timestamp`, including the first
    ties: u64,
}

/// Owns one trace's live and checkpoint-side state models
///
/// The live model is seeked arbitrarily by requests; the checkpoint-side
/// model only ever moves forward and is the sole feeder of the checkpoint
/// index. They are distinct instances under distinct locks, and the index
/// has its own lock again since it is read by restore while written by the
/// forward pass.
pub struct TraceStateManager {
    trace_id: TraceId,
    source: Arc<dyn TraceSource>,
    tables: NameTables,
    config: CheckpointConfig,
    experiment_end: TraceTime,
    live: Mutex<StateModel>,
    forward: Mutex<ForwardState>,
    checkpoints: RwLock<CheckpointIndex>,
}

impl TraceStateManager {
    /// Create a manager for one trace
    ///
    /// # Errors
    ///
    /// Returns `ManagerError::MissingTrace` when no source is given, and
    /// `ManagerError::Init` when the zero state cannot be built.
    pub fn new(
        trace_id: TraceId,
        source: Option<Arc<dyn TraceSource>>,
        tables: NameTables,
        config: CheckpointConfig,
    ) -> Result<Self, ManagerError> {
        let source = source.ok_or(ManagerError::MissingTrace)?;
        let ctx = InitContext::new(trace_id, source.num_cpus(), source.start_time());
        let model = StateModel::init(Some(&ctx), tables.clone())
            .map_err(|e| ManagerError::Init(e.to_string()))?;

        let zero = Checkpoint::new(0, source.start_time(), 0, model.clone());
        let experiment_end = source.end_time();

        Ok(Self {
            trace_id,
            source,
            tables,
            config,
            experiment_end,
            live: Mutex::new(model.clone()),
            forward: Mutex::new(ForwardState {
                model,
                dispatcher: EventDispatcher::new(),
                counter: 0,
                last_timestamp: TraceTime::MIN,
                ties: 0,
            }),
            checkpoints: RwLock::new(CheckpointIndex::new(zero)),
        })
    }

    /// Extend the seekable bound to the experiment end (multi-trace setups)
    #[must_use]
    pub fn with_experiment_end(mut self, end: TraceTime) -> Self {
        self.experiment_end = end;
        self
    }

    /// Trace this manager reconstructs
    #[must_use]
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// Timestamp of the trace's first event
    #[must_use]
    pub fn start_time(&self) -> TraceTime {
        self.source.start_time()
    }

    /// Timestamp of the trace's last event
    #[must_use]
    pub fn end_time(&self) -> TraceTime {
        self.source.end_time()
    }

    /// The underlying trace source
    #[must_use]
    pub fn source(&self) -> &Arc<dyn TraceSource> {
        &self.source
    }

    /// Feed one event to the checkpoint-side model
    ///
    /// Advances the forward counter and saves a checkpoint when the counter
    /// reaches a multiple of the configured interval. Only the indexing pass
    /// calls this; request execution never touches the checkpoint-side model.
    pub fn advance_forward(&self, event: &RawEvent) {
        let mut guard = lock(&self.forward);
        let forward = &mut *guard;
        forward.dispatcher.process(event, &mut forward.model);
        forward.counter += 1;
        if event.timestamp == forward.last_timestamp {
            forward.ties += 1;
        } else {
            forward.last_timestamp = event.timestamp;
            forward.ties = 1;
        }
        self.save_checkpoint_if_needed(forward);
    }

    fn save_checkpoint_if_needed(&self, forward: &ForwardState) {
        if self.config.interval == 0 || forward.counter % self.config.interval != 0 {
            return;
        }
        let checkpoint = Checkpoint::new(
            forward.counter,
            forward.last_timestamp,
            forward.ties,
            forward.model.clone(),
        );
        write(&self.checkpoints).push(checkpoint);
        tracing::debug!(
            trace = %self.trace_id,
            counter = forward.counter,
            timestamp = %forward.last_timestamp,
            "checkpoint saved"
        );
    }

    /// Restore the live model from the nearest checkpoint at or before `t`
    ///
    /// Rounds down to the previous checkpoint when `t` is between two saves
    /// and clamps to the zero checkpoint when `t` precedes the trace start.
    /// Returns the restored position; hand it to [`Self::resume_cursor`] to
    /// obtain the events forward replay must feed to reach `t` exactly.
    /// Returns `None` when `t` lies beyond the experiment end.
    pub fn restore_checkpoint_by_timestamp(&self, t: TraceTime) -> Option<RestorePoint> {
        if t > self.experiment_end {
            tracing::warn!(trace = %self.trace_id, target = %t, "seek beyond experiment end");
            return None;
        }
        let index = read(&self.checkpoints);
        let checkpoint = index.lookup(t);
        let mut live = lock(&self.live);
        *live = checkpoint.state.clone();
        tracing::debug!(
            trace = %self.trace_id,
            target = %t,
            restored = %checkpoint.timestamp,
            "live model restored from checkpoint"
        );
        Some(RestorePoint {
            timestamp: checkpoint.timestamp,
            event_count: checkpoint.event_count,
            tied_events: checkpoint.tied_events,
        })
    }

    /// Cursor positioned on the first event the restored snapshot lacks
    ///
    /// Seeks the source to the restore timestamp, then skips the events at
    /// that timestamp the snapshot already contains. A checkpoint can land
    /// mid-tie, so resuming at `timestamp + 1` would drop the rest of the
    /// tie and resuming at `timestamp` would apply the whole tie twice.
    ///
    /// # Errors
    ///
    /// Propagates source read failures hit while skipping.
    pub fn resume_cursor(&self, point: &RestorePoint) -> CoreResult<Box<dyn EventCursor>> {
        let mut cursor = self.source.cursor_at(point.timestamp);
        for _ in 0..point.tied_events {
            cursor.next()?;
        }
        Ok(cursor)
    }

    /// Apply one event to the live model through `dispatcher`
    pub fn process_live(&self, dispatcher: &mut EventDispatcher, event: &RawEvent) -> bool {
        let mut live = lock(&self.live);
        dispatcher.process(event, &mut live)
    }

    /// Deep copy of the live model at its current position
    #[must_use]
    pub fn live_snapshot(&self) -> StateModel {
        lock(&self.live).clone()
    }

    /// Run a closure against the live model
    pub fn with_live<R>(&self, f: impl FnOnce(&StateModel) -> R) -> R {
        f(&lock(&self.live))
    }

    /// Checkpoints saved so far, including the zero checkpoint
    #[must_use]
    pub fn checkpoint_count(&self) -> usize {
        read(&self.checkpoints).len()
    }

    /// Events consumed by the checkpoint-side model
    #[must_use]
    pub fn forward_counter(&self) -> u64 {
        lock(&self.forward).counter
    }

    /// Marker names the checkpoint-side pass could not handle
    #[must_use]
    pub fn forward_not_handled(&self) -> Vec<String> {
        lock(&self.forward)
            .dispatcher
            .not_handled()
            .iter()
            .cloned()
            .collect()
    }

    /// Discard all checkpoints and rebuild the checkpoint side from zero
    ///
    /// Used when the checkpoint interval configuration changes. The live
    /// model is left as-is; the next restore replaces it.
    pub fn clear_checkpoints(&self) {
        let ctx = InitContext::new(self.trace_id, self.source.num_cpus(), self.source.start_time());
        let model = StateModel::init(Some(&ctx), self.tables.clone())
            .unwrap_or_else(|_| lock(&self.forward).model.clone());

        let mut forward = lock(&self.forward);
        forward.model = model.clone();
        forward.dispatcher = EventDispatcher::new();
        forward.counter = 0;
        forward.last_timestamp = TraceTime::MIN;
        forward.ties = 0;

        write(&self.checkpoints).reset(Checkpoint::new(0, self.source.start_time(), 0, model));
        tracing::debug!(trace = %self.trace_id, "checkpoints cleared");
    }

    /// CPU count of the traced system
    #[must_use]
    pub fn num_cpus(&self) -> usize {
        self.source.num_cpus()
    }
}

// A poisoned lock only means another thread panicked mid-update of a model
// that is about to be overwritten or re-read whole; keep going.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(rwlock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    rwlock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(rwlock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    rwlock.write().unwrap_or_else(PoisonError::into_inner)
}
