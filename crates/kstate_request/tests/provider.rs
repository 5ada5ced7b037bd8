//! End-to-end tests of the request layer: coalescing, cancellation,
//! checkpoint-backed seeks, and synthetic sequencing across traces.

use kstate_core::{CoreError, CoreResult, CpuId, TimeRange, TraceId, TraceTime};
use kstate_dispatch::EventDispatcher;
use kstate_event::{EventCursor, FieldValue, MemoryTraceSource, RawEvent, TraceSource};
use kstate_manager::CheckpointConfig;
use kstate_model::{InitContext, NameTables, StateModel};
use kstate_request::{EventProvider, Phase, RequestHandle, RequestListener, RequestSpec, SyntheticEvent};
use std::sync::{Arc, Mutex};

fn sched(t: i64, prev: u64, next: u64) -> RawEvent {
    RawEvent::new(TraceTime::from_nanos(t), "sched_schedule", CpuId::new(0))
        .with_field("prev_pid", FieldValue::Unsigned(prev))
        .with_field("next_pid", FieldValue::Unsigned(next))
        .with_field("prev_state", FieldValue::Signed(0))
}

/// Alternating context switches, one event every 10ns starting at t=10
fn make_events(count: usize) -> Vec<RawEvent> {
    (0..count)
        .map(|n| {
            let (prev, next) = if n % 2 == 0 { (0, 7) } else { (7, 0) };
            sched((n as i64 + 1) * 10, prev, next)
        })
        .collect()
}

fn make_provider(events: Vec<RawEvent>, interval: u64) -> EventProvider {
    let source: Arc<dyn TraceSource> = Arc::new(MemoryTraceSource::new(events, 1));
    EventProvider::new(
        vec![source],
        NameTables::linux_default(),
        CheckpointConfig::new().with_interval(interval),
    )
    .unwrap()
}

fn range(start: i64, end: i64) -> TimeRange {
    TimeRange::new(TraceTime::from_nanos(start), TraceTime::from_nanos(end))
}

#[derive(Default)]
struct Recording {
    started: usize,
    completed: usize,
    cancelled: usize,
    failed: Vec<CoreError>,
    phases: Vec<(Phase, u32, Option<i64>)>,
}

impl Recording {
    fn after_timestamps(&self) -> Vec<i64> {
        self.phases
            .iter()
            .filter(|(phase, _, _)| *phase == Phase::After)
            .filter_map(|(_, _, t)| *t)
            .collect()
    }

    fn phase_count(&self, phase: Phase) -> usize {
        self.phases.iter().filter(|(p, _, _)| *p == phase).count()
    }
}

struct Recorder {
    recording: Arc<Mutex<Recording>>,
}

impl Recorder {
    fn new() -> (Self, Arc<Mutex<Recording>>) {
        let recording = Arc::new(Mutex::new(Recording::default()));
        (
            Self {
                recording: Arc::clone(&recording),
            },
            recording,
        )
    }
}

impl RequestListener for Recorder {
    fn on_started(&mut self) {
        self.recording.lock().unwrap().started += 1;
    }

    fn on_data(&mut self, event: &SyntheticEvent, _state: &StateModel) {
        self.recording.lock().unwrap().phases.push((
            event.phase,
            event.trace_id.as_u32(),
            event.raw().map(|r| r.timestamp.as_nanos()),
        ));
    }

    fn on_completed(&mut self) {
        self.recording.lock().unwrap().completed += 1;
    }

    fn on_cancelled(&mut self) {
        self.recording.lock().unwrap().cancelled += 1;
    }

    fn on_failed(&mut self, error: &CoreError) {
        self.recording.lock().unwrap().failed.push(error.clone());
    }
}

#[tokio::test]
async fn test_single_request_delivers_range_in_order() {
    let provider = make_provider(make_events(100), 0);
    let (recorder, recording) = Recorder::new();
    let handle = provider.request_time_range(
        RequestSpec::new(range(100, 300)),
        Box::new(recorder),
    );

    provider.execute_pending().await.unwrap();
    handle.wait_for_completion().await;

    let recording = recording.lock().unwrap();
    assert_eq!(recording.started, 1);
    assert_eq!(recording.completed, 1);
    assert_eq!(recording.phase_count(Phase::StartReq), 1);
    assert_eq!(recording.phase_count(Phase::EndReq), 1);

    // Both range bounds are inclusive
    let after: Vec<i64> = (100..=300).step_by(10).collect();
    assert_eq!(recording.after_timestamps(), after);
    assert_eq!(handle.delivered(), after.len());

    // Every raw event arrives as a Before/After pair in order
    assert_eq!(recording.phase_count(Phase::Before), after.len());
    let raw_phases: Vec<Phase> = recording
        .phases
        .iter()
        .filter(|(p, _, _)| matches!(p, Phase::Before | Phase::After))
        .map(|(p, _, _)| *p)
        .collect();
    for pair in raw_phases.chunks(2) {
        assert_eq!(pair, [Phase::Before, Phase::After]);
    }
}

#[tokio::test]
async fn test_overlapping_requests_coalesce_into_one_pass() {
    let provider = make_provider(make_events(100), 0);
    let (rec_a, recording_a) = Recorder::new();
    let (rec_b, recording_b) = Recorder::new();

    let a = provider.request_time_range(RequestSpec::new(range(100, 300)), Box::new(rec_a));
    let b = provider.request_time_range(RequestSpec::new(range(250, 500)), Box::new(rec_b));

    // One execution serves both
    provider.execute_pending().await.unwrap();
    a.wait_for_completion().await;
    b.wait_for_completion().await;

    let expect_a: Vec<i64> = (100..=300).step_by(10).collect();
    let expect_b: Vec<i64> = (250..=500).step_by(10).collect();
    assert_eq!(recording_a.lock().unwrap().after_timestamps(), expect_a);
    assert_eq!(recording_b.lock().unwrap().after_timestamps(), expect_b);
    assert_eq!(recording_a.lock().unwrap().completed, 1);
    assert_eq!(recording_b.lock().unwrap().completed, 1);
}

/// Cancels its own request the first time any data arrives
struct CancelOnFirstData {
    handle: Arc<Mutex<Option<RequestHandle>>>,
    fired: bool,
}

impl RequestListener for CancelOnFirstData {
    fn on_data(&mut self, _event: &SyntheticEvent, _state: &StateModel) {
        if !self.fired {
            self.fired = true;
            if let Some(handle) = self.handle.lock().unwrap().as_ref() {
                handle.cancel();
            }
        }
    }
}

#[tokio::test]
async fn test_cancellation_stops_at_block_boundary() {
    let provider = make_provider(make_events(10_000), 0);
    let slot = Arc::new(Mutex::new(None));
    let listener = CancelOnFirstData {
        handle: Arc::clone(&slot),
        fired: false,
    };

    let handle = provider.request_time_range(
        RequestSpec::new(provider.experiment_range()),
        Box::new(listener),
    );
    *slot.lock().unwrap() = Some(handle.clone());

    provider.execute_pending().await.unwrap();
    handle.wait_for_completion().await;

    // The flag is polled every block of delivered events, so exactly one
    // block goes through before the stop takes effect.
    assert!(handle.is_cancelled());
    assert_eq!(handle.delivered(), 100);
}

#[tokio::test]
async fn test_cancel_after_completion_is_a_no_op() {
    let provider = make_provider(make_events(10), 0);
    let (recorder, recording) = Recorder::new();
    let handle =
        provider.request_time_range(RequestSpec::new(range(10, 100)), Box::new(recorder));

    provider.execute_pending().await.unwrap();
    handle.wait_for_completion().await;
    handle.cancel();

    assert!(!handle.is_cancelled());
    assert_eq!(recording.lock().unwrap().completed, 1);
    assert_eq!(recording.lock().unwrap().cancelled, 0);
}

#[test]
fn test_default_interval_checkpoint_cadence() {
    let provider = make_provider(make_events(15_316), 1_000);
    let indexed = provider.index_trace(TraceId::new(0)).unwrap();
    assert_eq!(indexed, 15_316);

    // Zero checkpoint plus one per full interval
    assert_eq!(provider.checkpoint_count(TraceId::new(0)).unwrap(), 16);

    provider.clear_checkpoints(TraceId::new(0)).unwrap();
    assert_eq!(provider.checkpoint_count(TraceId::new(0)).unwrap(), 1);
}

#[tokio::test]
async fn test_multi_trace_merge_and_end_markers() {
    let t0: Arc<dyn TraceSource> = Arc::new(MemoryTraceSource::new(
        vec![sched(10, 0, 7), sched(30, 7, 0)],
        1,
    ));
    let t1: Arc<dyn TraceSource> = Arc::new(MemoryTraceSource::new(
        vec![sched(20, 0, 9), sched(40, 9, 0)],
        1,
    ));
    let provider = EventProvider::new(
        vec![t0, t1],
        NameTables::linux_default(),
        CheckpointConfig::default(),
    )
    .unwrap();

    let (recorder, recording) = Recorder::new();
    let handle =
        provider.request_time_range(RequestSpec::new(range(10, 40)), Box::new(recorder));
    provider.execute_pending().await.unwrap();
    handle.wait_for_completion().await;

    let recording = recording.lock().unwrap();
    // Interleaved by timestamp, attributed to the owning trace
    let after: Vec<(u32, i64)> = recording
        .phases
        .iter()
        .filter(|(p, _, _)| *p == Phase::After)
        .map(|(_, trace, t)| (*trace, t.unwrap()))
        .collect();
    assert_eq!(after, vec![(0, 10), (1, 20), (0, 30), (1, 40)]);

    // One start marker per request, one end marker per trace
    assert_eq!(recording.phase_count(Phase::StartReq), 1);
    let ends: Vec<u32> = recording
        .phases
        .iter()
        .filter(|(p, _, _)| *p == Phase::EndReq)
        .map(|(_, trace, _)| *trace)
        .collect();
    assert_eq!(ends, vec![0, 1]);
}

#[tokio::test]
async fn test_dispatch_offset_suppresses_early_delivery() {
    let events = make_events(10); // t = 10..100
    let provider = make_provider(events.clone(), 0);
    let (recorder, recording) = Recorder::new();

    let spec = RequestSpec::new(range(10, 100))
        .with_dispatch_offset(TraceTime::from_nanos(60));
    let handle = provider.request_time_range(spec, Box::new(recorder));
    provider.execute_pending().await.unwrap();
    handle.wait_for_completion().await;

    // Only events from the offset onward are delivered
    let after: Vec<i64> = (60..=100).step_by(10).collect();
    assert_eq!(recording.lock().unwrap().after_timestamps(), after);

    // Earlier events still updated state: the live model matches a full
    // from-scratch replay of the whole range.
    let ctx = InitContext::new(TraceId::new(0), 1, TraceTime::from_nanos(10));
    let mut expected = StateModel::init(Some(&ctx), NameTables::linux_default()).unwrap();
    let mut dispatcher = EventDispatcher::new();
    for event in &events {
        dispatcher.process(event, &mut expected);
    }
    assert_eq!(provider.state_model(TraceId::new(0)).unwrap(), expected);
}

#[tokio::test]
async fn test_max_events_caps_delivery() {
    let provider = make_provider(make_events(50), 0);
    let (recorder, recording) = Recorder::new();
    let spec = RequestSpec::new(range(10, 500)).with_max_events(5);
    let handle = provider.request_time_range(spec, Box::new(recorder));

    provider.execute_pending().await.unwrap();
    handle.wait_for_completion().await;

    assert_eq!(handle.delivered(), 5);
    assert_eq!(
        recording.lock().unwrap().after_timestamps(),
        vec![10, 20, 30, 40, 50]
    );
    assert_eq!(recording.lock().unwrap().completed, 1);
}

#[tokio::test]
async fn test_checkpoint_restore_matches_from_scratch_replay() {
    let events = make_events(50); // t = 10..500
    let provider = make_provider(events.clone(), 10);
    provider.index_trace(TraceId::new(0)).unwrap();

    let (recorder, _recording) = Recorder::new();
    let handle =
        provider.request_time_range(RequestSpec::new(range(300, 400)), Box::new(recorder));
    provider.execute_pending().await.unwrap();
    handle.wait_for_completion().await;

    // The request seeks through a checkpoint and replays forward; the result
    // must be indistinguishable from replaying every event up to the range
    // end from the zero state.
    let target = TraceTime::from_nanos(400);
    let ctx = InitContext::new(TraceId::new(0), 1, TraceTime::from_nanos(10));
    let mut expected = StateModel::init(Some(&ctx), NameTables::linux_default()).unwrap();
    let mut dispatcher = EventDispatcher::new();
    for event in events.iter().filter(|e| e.timestamp <= target) {
        dispatcher.process(event, &mut expected);
    }
    assert_eq!(provider.state_model(TraceId::new(0)).unwrap(), expected);
}

#[tokio::test]
async fn test_out_of_range_request_completes_empty() {
    let provider = make_provider(make_events(10), 0); // trace ends at t=100
    let (recorder, recording) = Recorder::new();
    let handle =
        provider.request_time_range(RequestSpec::new(range(5_000, 6_000)), Box::new(recorder));

    provider.execute_pending().await.unwrap();
    handle.wait_for_completion().await;

    let recording = recording.lock().unwrap();
    assert_eq!(handle.delivered(), 0);
    assert_eq!(recording.completed, 1);
    assert_eq!(recording.phase_count(Phase::After), 0);
    // The request still opens and closes normally
    assert_eq!(recording.phase_count(Phase::StartReq), 1);
    assert_eq!(recording.phase_count(Phase::EndReq), 1);
}

/// A source whose cursor breaks after a fixed number of events
struct FlakySource {
    events: Vec<RawEvent>,
    fail_after: usize,
}

struct FlakyCursor {
    events: Vec<RawEvent>,
    position: usize,
    fail_after: usize,
}

impl TraceSource for FlakySource {
    fn start_time(&self) -> TraceTime {
        self.events.first().map_or(TraceTime::zero(), |e| e.timestamp)
    }

    fn end_time(&self) -> TraceTime {
        self.events.last().map_or(TraceTime::zero(), |e| e.timestamp)
    }

    fn num_cpus(&self) -> usize {
        1
    }

    fn cursor_at(&self, at: TraceTime) -> Box<dyn EventCursor> {
        let position = self.events.partition_point(|e| e.timestamp < at);
        Box::new(FlakyCursor {
            events: self.events.clone(),
            position,
            fail_after: self.fail_after,
        })
    }
}

impl EventCursor for FlakyCursor {
    fn next(&mut self) -> CoreResult<Option<RawEvent>> {
        if self.position >= self.fail_after {
            return Err(CoreError::SourceFailure {
                reason: "short read".to_string(),
            });
        }
        let event = self.events.get(self.position).cloned();
        self.position += 1;
        Ok(event)
    }
}

#[tokio::test]
async fn test_source_failure_fails_the_request() {
    let source: Arc<dyn TraceSource> = Arc::new(FlakySource {
        events: make_events(20),
        fail_after: 5,
    });
    let provider = EventProvider::new(
        vec![source],
        NameTables::linux_default(),
        CheckpointConfig::default(),
    )
    .unwrap();

    let (recorder, recording) = Recorder::new();
    let handle =
        provider.request_time_range(RequestSpec::new(range(10, 200)), Box::new(recorder));

    let result = provider.execute_pending().await;
    assert!(matches!(result, Err(CoreError::SourceFailure { .. })));

    handle.wait_for_completion().await;
    let recording = recording.lock().unwrap();
    assert_eq!(recording.failed.len(), 1);
    assert_eq!(recording.completed, 0);
    assert!(!handle.is_cancelled());
    assert_eq!(handle.state(), kstate_request::RequestState::Failed);
}

#[tokio::test]
async fn test_failure_on_first_read_fails_the_request() {
    // The very first read happens while the merger primes its slots; the
    // request must still end up failed and notified, not left hanging.
    let source: Arc<dyn TraceSource> = Arc::new(FlakySource {
        events: make_events(20),
        fail_after: 0,
    });
    let provider = EventProvider::new(
        vec![source],
        NameTables::linux_default(),
        CheckpointConfig::default(),
    )
    .unwrap();

    let (recorder, recording) = Recorder::new();
    let handle =
        provider.request_time_range(RequestSpec::new(range(10, 200)), Box::new(recorder));

    let result = provider.execute_pending().await;
    assert!(matches!(result, Err(CoreError::SourceFailure { .. })));

    handle.wait_for_completion().await;
    let recording = recording.lock().unwrap();
    assert_eq!(recording.failed.len(), 1);
    assert_eq!(recording.completed, 0);
    assert_eq!(recording.phase_count(Phase::After), 0);
    assert_eq!(handle.state(), kstate_request::RequestState::Failed);
}

#[tokio::test]
async fn test_concurrent_executions_serialize() {
    let events = make_events(200); // t = 10..2000
    let provider = make_provider(events.clone(), 10);
    provider.index_trace(TraceId::new(0)).unwrap();

    let (rec_a, recording_a) = Recorder::new();
    let (rec_b, recording_b) = Recorder::new();
    let a = provider.request_time_range(RequestSpec::new(range(100, 500)), Box::new(rec_a));

    let other = provider.clone();
    let first = tokio::spawn(async move { other.execute_pending().await });
    let b =
        provider.request_time_range(RequestSpec::new(range(1_000, 1_500)), Box::new(rec_b));
    let second = provider.execute_pending();

    let (first, second) = tokio::join!(first, second);
    first.unwrap().unwrap();
    second.unwrap();
    a.wait_for_completion().await;
    b.wait_for_completion().await;

    // Each request sees exactly its own range no matter how the two
    // executions interleave or which batch picked it up.
    let expect_a: Vec<i64> = (100..=500).step_by(10).collect();
    let expect_b: Vec<i64> = (1_000..=1_500).step_by(10).collect();
    assert_eq!(recording_a.lock().unwrap().after_timestamps(), expect_a);
    assert_eq!(recording_b.lock().unwrap().after_timestamps(), expect_b);
    assert_eq!(recording_a.lock().unwrap().completed, 1);
    assert_eq!(recording_b.lock().unwrap().completed, 1);

    // Whichever batch ran last left the live model at its own range end.
    // Interleaved batches would leave a state matching neither replay.
    let ctx = InitContext::new(TraceId::new(0), 1, TraceTime::from_nanos(10));
    let mut to_500 = StateModel::init(Some(&ctx), NameTables::linux_default()).unwrap();
    let mut to_1500 = to_500.clone();
    let mut dispatcher = EventDispatcher::new();
    for event in events.iter().filter(|e| e.timestamp.as_nanos() <= 500) {
        dispatcher.process(event, &mut to_500);
    }
    let mut dispatcher = EventDispatcher::new();
    for event in events.iter().filter(|e| e.timestamp.as_nanos() <= 1_500) {
        dispatcher.process(event, &mut to_1500);
    }
    let live = provider.state_model(TraceId::new(0)).unwrap();
    assert!(live == to_500 || live == to_1500);
}

#[tokio::test]
async fn test_request_over_a_checkpoint_landing_mid_tie() {
    // Two events share t=50 and the checkpoint (interval 2) lands between
    // them. A request seeking past the checkpoint must still replay the
    // second half of the tie: pid 9 is born there, and losing that event
    // leaves a live model no from-scratch replay can produce.
    let events = vec![
        sched(10, 0, 7),
        sched(50, 7, 0),
        sched(50, 0, 9),
        sched(60, 9, 7),
        sched(90, 7, 0),
    ];
    let provider = make_provider(events.clone(), 2);
    provider.index_trace(TraceId::new(0)).unwrap();

    let (recorder, recording) = Recorder::new();
    let handle =
        provider.request_time_range(RequestSpec::new(range(55, 90)), Box::new(recorder));
    provider.execute_pending().await.unwrap();
    handle.wait_for_completion().await;

    assert_eq!(recording.lock().unwrap().after_timestamps(), vec![60, 90]);

    let ctx = InitContext::new(TraceId::new(0), 1, TraceTime::from_nanos(10));
    let mut expected = StateModel::init(Some(&ctx), NameTables::linux_default()).unwrap();
    let mut dispatcher = EventDispatcher::new();
    for event in &events {
        dispatcher.process(event, &mut expected);
    }
    assert_eq!(provider.state_model(TraceId::new(0)).unwrap(), expected);
}

#[tokio::test]
async fn test_execute_with_empty_queue_is_a_no_op() {
    let provider = make_provider(make_events(10), 0);
    provider.execute_pending().await.unwrap();
}
