//! Session frame pipeline
//!
//! Lifecycle: Idle -> Processing -> Draining -> Stopped. Submission never
//! blocks; a full queue drops the frame. Stop raises a shutdown signal, the
//! worker exits at its next dequeue check and discards anything still queued.

use proctor::{Alert, Event, FrameAnalysis, ProctorDetector};
use serde::Serialize;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::{self, JoinHandle};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use video_frame::VideoFrame;

/// Frames buffered per session before submissions are dropped
pub const DEFAULT_QUEUE_CAPACITY: usize = 30;

/// Default upper bound for [`Session::poll_batch`]
pub const DEFAULT_POLL_BATCH: usize = 5;

/// How long the worker waits on the queue before re-checking shutdown
const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(250);

/// Pipeline lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PipelineState {
    Idle = 0,
    Processing = 1,
    Draining = 2,
    Stopped = 3,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PipelineState::Idle,
            1 => PipelineState::Processing,
            2 => PipelineState::Draining,
            _ => PipelineState::Stopped,
        }
    }

    /// Accepting submissions
    pub fn is_open(&self) -> bool {
        matches!(self, PipelineState::Idle | PipelineState::Processing)
    }
}

/// Item produced by a session worker
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionOutput {
    Event {
        session_id: String,
        #[serde(flatten)]
        event: Event,
    },
    Alert {
        session_id: String,
        #[serde(flatten)]
        alert: Alert,
    },
}

impl SessionOutput {
    pub fn session_id(&self) -> &str {
        match self {
            SessionOutput::Event { session_id, .. } | SessionOutput::Alert { session_id, .. } => {
                session_id
            }
        }
    }
}

/// Pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Submissions while open
    pub submitted: u64,
    /// Submissions that made it into the queue
    pub accepted: u64,
    /// Submissions dropped because the queue was full
    pub dropped: u64,
    /// Frames analyzed successfully
    pub processed: u64,
    /// Frames that failed or panicked during analysis
    pub errors: u64,
    /// Frames still queued when the worker stopped
    pub discarded: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    accepted: AtomicU64,
    dropped: AtomicU64,
    processed: AtomicU64,
    errors: AtomicU64,
    discarded: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Queued frame with its submission-time options
struct FrameSubmission {
    frame: VideoFrame,
    ts: f64,
    capture_reference: bool,
}

/// Handle to one session's pipeline
pub struct Session {
    id: String,
    frames: mpsc::Sender<FrameSubmission>,
    outputs: Mutex<mpsc::UnboundedReceiver<SessionOutput>>,
    shutdown: watch::Sender<bool>,
    state: Arc<AtomicU8>,
    counters: Arc<Counters>,
    reference_requested: AtomicBool,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Start the worker task for `detector`. Must be called inside a tokio
    /// runtime.
    pub fn spawn(id: impl Into<String>, detector: ProctorDetector, queue_capacity: usize) -> Self {
        let id = id.into();
        let (frame_tx, frame_rx) = mpsc::channel(queue_capacity.max(1));
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = Arc::new(AtomicU8::new(PipelineState::Idle as u8));
        let counters = Arc::new(Counters::default());

        info!("Starting session {} (queue capacity {})", id, queue_capacity);
        let worker = Worker {
            session_id: id.clone(),
            detector: Arc::new(std::sync::Mutex::new(detector)),
            frames: frame_rx,
            outputs: output_tx,
            shutdown: shutdown_rx,
            state: state.clone(),
            counters: counters.clone(),
        };
        let handle = tokio::spawn(worker.run());

        Self {
            id,
            frames: frame_tx,
            outputs: Mutex::new(output_rx),
            shutdown: shutdown_tx,
            state,
            counters,
            reference_requested: AtomicBool::new(false),
            worker: std::sync::Mutex::new(Some(handle)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Capture a reference pose on the next accepted frame
    pub fn request_reference_capture(&self) {
        self.reference_requested.store(true, Ordering::Release);
    }

    /// Queue a frame taken at `ts` seconds. Returns whether it was accepted;
    /// a full queue or a closed session drops it silently.
    pub fn submit(&self, frame: VideoFrame, ts: f64) -> bool {
        self.submit_with_reference(frame, ts, false)
    }

    /// Like [`Session::submit`], optionally capturing a reference pose
    pub fn submit_with_reference(&self, frame: VideoFrame, ts: f64, capture_reference: bool) -> bool {
        if !self.state().is_open() {
            debug!("Session {} closed; ignoring frame", self.id);
            return false;
        }
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("proctor_frames_submitted_total").increment(1);

        let armed = self.reference_requested.swap(false, Ordering::AcqRel);
        let submission = FrameSubmission {
            frame,
            ts,
            capture_reference: capture_reference || armed,
        };

        match self.frames.try_send(submission) {
            Ok(()) => {
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                if armed {
                    self.reference_requested.store(true, Ordering::Release);
                }
                if let TrySendError::Full(_) = e {
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("proctor_frames_dropped_total").increment(1);
                    debug!("Session {} queue full; frame at {:.3}s dropped", self.id, ts);
                }
                false
            }
        }
    }

    /// Wait up to `wait` for the next output
    pub async fn poll(&self, wait: Duration) -> Option<SessionOutput> {
        let mut outputs = self.outputs.lock().await;
        timeout(wait, outputs.recv()).await.ok().flatten()
    }

    /// Up to `max` outputs that are ready now, oldest first
    pub async fn poll_batch(&self, max: usize) -> Vec<SessionOutput> {
        let mut outputs = self.outputs.lock().await;
        let mut batch = Vec::with_capacity(max);
        while batch.len() < max {
            match outputs.try_recv() {
                Ok(output) => batch.push(output),
                Err(_) => break,
            }
        }
        batch
    }

    /// Signal shutdown and wait for the worker to exit
    pub async fn stop(&self) {
        let mut current = self.state.load(Ordering::Acquire);
        while PipelineState::from_u8(current).is_open() {
            match self.state.compare_exchange(
                current,
                PipelineState::Draining as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    info!("Stopping session {}", self.id);
                    break;
                }
                Err(actual) => current = actual,
            }
        }
        let _ = self.shutdown.send(true);

        let handle = self.worker.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Session {} worker ended abnormally: {}", self.id, e);
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Owned worker side of a session. Analysis runs on the blocking pool;
/// the mutex is only ever held by one frame at a time.
struct Worker {
    session_id: String,
    detector: Arc<std::sync::Mutex<ProctorDetector>>,
    frames: mpsc::Receiver<FrameSubmission>,
    outputs: mpsc::UnboundedSender<SessionOutput>,
    shutdown: watch::Receiver<bool>,
    state: Arc<AtomicU8>,
    counters: Arc<Counters>,
}

impl Worker {
    async fn run(mut self) {
        debug!("Session {} worker running", self.session_id);

        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                next = timeout(DEQUEUE_TIMEOUT, self.frames.recv()) => next,
            };
            let submission = match next {
                Ok(Some(submission)) => submission,
                Ok(None) => break,
                Err(_) => continue,
            };

            self.transition(PipelineState::Idle, PipelineState::Processing);
            self.handle(submission).await;
            self.transition(PipelineState::Processing, PipelineState::Idle);
        }

        self.frames.close();
        let mut discarded = 0u64;
        while self.frames.try_recv().is_ok() {
            discarded += 1;
        }
        self.counters.discarded.fetch_add(discarded, Ordering::Relaxed);
        self.state
            .store(PipelineState::Stopped as u8, Ordering::Release);
        info!(
            "Session {} stopped ({} queued frames discarded)",
            self.session_id, discarded
        );
    }

    fn transition(&self, from: PipelineState, to: PipelineState) {
        let _ = self.state.compare_exchange(
            from as u8,
            to as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    async fn handle(&self, submission: FrameSubmission) {
        let FrameSubmission {
            frame,
            ts,
            capture_reference,
        } = submission;

        let detector = self.detector.clone();
        let job = task::spawn_blocking(move || {
            let mut detector = detector.lock().unwrap_or_else(PoisonError::into_inner);
            match catch_unwind(AssertUnwindSafe(|| {
                detector.process(&frame, ts, capture_reference)
            })) {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(payload) => Err(panic_message(payload.as_ref())),
            }
        });

        match job.await {
            Ok(Ok(analysis)) => {
                self.counters.processed.fetch_add(1, Ordering::Relaxed);
                self.emit(analysis);
            }
            Ok(Err(message)) => self.fail(&message, ts),
            Err(e) => self.fail(&format!("analysis task failed: {e}"), ts),
        }
    }

    fn emit(&self, analysis: FrameAnalysis) {
        let session_id = &self.session_id;
        let events = analysis.events.into_iter().map(|event| SessionOutput::Event {
            session_id: session_id.clone(),
            event,
        });
        let alerts = analysis.alerts.into_iter().map(|alert| SessionOutput::Alert {
            session_id: session_id.clone(),
            alert,
        });
        for output in events.chain(alerts) {
            // Receiver gone means the session handle was dropped
            if self.outputs.send(output).is_err() {
                break;
            }
        }
    }

    fn fail(&self, message: &str, ts: f64) {
        error!("Session {} frame at {:.3}s failed: {}", self.session_id, ts, message);
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
        let event = self
            .detector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_error(message, ts);
        let _ = self.outputs.send(SessionOutput::Event {
            session_id: self.session_id.clone(),
            event,
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic during frame analysis".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctor::{
        DetectorConfig, FaceBox, FaceMesh, LandmarkProvider, NoLandmarkModel, Observation,
        Point, ProctorError, ReplayProvider,
    };
    use storage::{MemoryEventLog, MemoryEvidenceStore};

    const WAIT: Duration = Duration::from_secs(2);

    fn detector(provider: Box<dyn LandmarkProvider>) -> ProctorDetector {
        ProctorDetector::new(
            "sess",
            DetectorConfig::default(),
            provider,
            Arc::new(MemoryEventLog::new()),
            Arc::new(MemoryEvidenceStore::new()),
        )
        .unwrap()
    }

    fn frame() -> VideoFrame {
        VideoFrame::filled(32, 24, [60, 60, 60])
    }

    fn type_name(output: &SessionOutput) -> &'static str {
        match output {
            SessionOutput::Event { event, .. } => event.type_name(),
            SessionOutput::Alert { .. } => "ALERT",
        }
    }

    struct FailingProvider;

    impl LandmarkProvider for FailingProvider {
        fn face_boxes(&mut self, _: &VideoFrame) -> Result<Vec<FaceBox>, ProctorError> {
            Err(ProctorError::Provider("model unavailable".to_string()))
        }

        fn face_meshes(&mut self, _: &VideoFrame) -> Result<Vec<FaceMesh>, ProctorError> {
            Ok(Vec::new())
        }
    }

    struct PanickingProvider;

    impl LandmarkProvider for PanickingProvider {
        fn face_boxes(&mut self, _: &VideoFrame) -> Result<Vec<FaceBox>, ProctorError> {
            panic!("landmark model crashed")
        }

        fn face_meshes(&mut self, _: &VideoFrame) -> Result<Vec<FaceMesh>, ProctorError> {
            Ok(Vec::new())
        }
    }

    struct SlowProvider;

    impl LandmarkProvider for SlowProvider {
        fn face_boxes(&mut self, _: &VideoFrame) -> Result<Vec<FaceBox>, ProctorError> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(Vec::new())
        }

        fn face_meshes(&mut self, _: &VideoFrame) -> Result<Vec<FaceMesh>, ProctorError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_slow_analysis_does_not_block_runtime() {
        let session = Session::spawn("s8", detector(Box::new(SlowProvider)), 30);
        session.submit(frame(), 1.0);

        // Single-threaded runtime: this timer only fires on time if the
        // analysis is off the async worker
        let start = std::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(start.elapsed() < Duration::from_millis(250));

        let output = session.poll(WAIT).await.unwrap();
        assert_eq!(type_name(&output), "ABSENCE_TICK");
        session.stop().await;
    }

    #[tokio::test]
    async fn test_drop_on_full_keeps_output_bounded_and_ordered() {
        let session = Session::spawn("s1", detector(Box::new(NoLandmarkModel::default())), 30);

        // No await in the loop: the worker cannot drain while we submit
        let accepted: Vec<f64> = (0..200)
            .map(|i| i as f64 * 0.01)
            .filter(|&ts| session.submit(frame(), ts))
            .collect();

        let stats = session.stats();
        assert_eq!(stats.submitted, 200);
        assert_eq!(stats.accepted, 30);
        assert_eq!(stats.dropped, 170);
        assert_eq!(accepted.len(), 30);

        let mut seen = Vec::new();
        while seen.len() < accepted.len() {
            match session.poll(WAIT).await {
                Some(SessionOutput::Event { event, .. }) => seen.push(event.ts),
                Some(other) => panic!("unexpected output {other:?}"),
                None => break,
            }
        }
        assert_eq!(seen, accepted);
        assert!(session.poll(Duration::from_millis(50)).await.is_none());

        session.stop().await;
        assert_eq!(session.state(), PipelineState::Stopped);
        assert_eq!(session.stats().processed, 30);
    }

    #[tokio::test]
    async fn test_stop_discards_queued_frames() {
        let session = Session::spawn("s2", detector(Box::new(NoLandmarkModel::default())), 30);
        for i in 0..10 {
            assert!(session.submit(frame(), i as f64));
        }

        session.stop().await;
        let stats = session.stats();
        assert_eq!(stats.processed, 0);
        assert_eq!(stats.discarded, 10);
        assert_eq!(session.state(), PipelineState::Stopped);

        // Closed sessions ignore submissions without erroring
        assert!(!session.submit(frame(), 20.0));
        assert_eq!(session.stats().submitted, 10);
    }

    #[tokio::test]
    async fn test_poll_times_out_when_idle() {
        let session = Session::spawn("s3", detector(Box::new(NoLandmarkModel::default())), 30);
        assert!(session.poll(Duration::from_millis(20)).await.is_none());
        assert!(session.poll_batch(DEFAULT_POLL_BATCH).await.is_empty());
        assert_eq!(session.state(), PipelineState::Idle);
        session.stop().await;
    }

    #[tokio::test]
    async fn test_poll_batch_respects_max() {
        let session = Session::spawn("s4", detector(Box::new(NoLandmarkModel::default())), 30);
        for i in 0..8 {
            session.submit(frame(), i as f64 * 0.1);
        }

        // Wait for the last frame's output, then leave the rest queued
        let mut first = Vec::new();
        for _ in 0..8 {
            first.extend(session.poll(WAIT).await);
        }
        assert_eq!(first.len(), 8);

        for i in 8..16 {
            session.submit(frame(), i as f64 * 0.1);
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let batch = session.poll_batch(DEFAULT_POLL_BATCH).await;
        assert_eq!(batch.len(), DEFAULT_POLL_BATCH);
        session.stop().await;
    }

    #[tokio::test]
    async fn test_provider_error_becomes_error_event() {
        let session = Session::spawn("s5", detector(Box::new(FailingProvider)), 30);
        session.submit(frame(), 1.0);

        let output = session.poll(WAIT).await.unwrap();
        assert_eq!(type_name(&output), "ERROR");
        assert_eq!(output.session_id(), "s5");

        // The worker keeps going after a failure
        session.submit(frame(), 2.0);
        assert!(session.poll(WAIT).await.is_some());
        assert_eq!(session.stats().errors, 2);
        session.stop().await;
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let session = Session::spawn("s6", detector(Box::new(PanickingProvider)), 30);
        session.submit(frame(), 1.0);

        match session.poll(WAIT).await {
            Some(SessionOutput::Event { event, .. }) => match event.kind {
                proctor::EventKind::Error { error } => assert!(error.contains("crashed")),
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(session.state(), PipelineState::Idle);
        session.stop().await;
    }

    #[tokio::test]
    async fn test_reference_request_applies_to_next_frame() {
        let mesh = FaceMesh::from_keypoints(
            Point::new(0.5, 0.5),
            Point::new(0.5, 0.35),
            Point::new(0.38, 0.5),
            Point::new(0.45, 0.46),
            Point::new(0.62, 0.5),
            Point::new(0.55, 0.46),
        );
        let provider = ReplayProvider::new([Observation::single(mesh)]);
        let session = Session::spawn("s7", detector(Box::new(provider)), 30);

        session.request_reference_capture();
        session.submit(frame(), 0.0);
        session.submit(frame(), 0.1);

        let mut names = Vec::new();
        while let Some(output) = session.poll(Duration::from_millis(300)).await {
            names.push(type_name(&output));
        }
        assert_eq!(names, vec!["REFERENCE_CAPTURED", "FREEZE_TICK"]);
        session.stop().await;
    }

    #[test]
    fn test_output_wire_format() {
        let output = SessionOutput::Event {
            session_id: "abc".to_string(),
            event: Event::new(1.5, proctor::EventKind::MultiFace { faces: 2 }),
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["kind"], "event");
        assert_eq!(json["session_id"], "abc");
        assert_eq!(json["type"], "MULTI_FACE");
        assert_eq!(json["faces"], 2);
        assert_eq!(json["ts"], 1.5);
    }
}
