//! Per-session detector orchestration

use crate::analysis::{Alert, FrameAnalysis};
use crate::deviation::DeviationDetector;
use crate::event::{Event, EventKind};
use crate::freeze::FreezeDetector;
use crate::gaze::GazeTracker;
use crate::landmarks::{FaceKeypoints, LandmarkProvider, ProviderSettings};
use crate::presence::PresenceMonitor;
use crate::reference;
use crate::rules::RuleAggregator;
use crate::state::FaceTracks;
use crate::tamper::TamperDetector;
use crate::zone::ZoneClassifier;
use crate::{DetectorConfig, ProctorError};
use serde_json::Value;
use std::sync::Arc;
use storage::{EventLog, EvidenceStore};
use tracing::{debug, info, warn};
use video_frame::VideoFrame;

/// Runs every detector over a session's frames, in submission order.
///
/// Owns all per-session mutable state: face tracks, presence, background
/// model and alert cooldowns. Not shared; the session worker drives it.
pub struct ProctorDetector {
    session_id: String,
    config: DetectorConfig,
    settings: ProviderSettings,
    provider: Box<dyn LandmarkProvider>,
    zones: ZoneClassifier,
    tracks: FaceTracks,
    presence: PresenceMonitor,
    gaze: GazeTracker,
    deviation: DeviationDetector,
    freeze: FreezeDetector,
    tamper: TamperDetector,
    rules: RuleAggregator,
    /// Latest frame time seen; detector timers never run backwards
    clock: Option<f64>,
    log: Arc<dyn EventLog>,
    evidence: Arc<dyn EvidenceStore>,
}

impl ProctorDetector {
    /// Create a detector; the configuration is validated once here
    pub fn new(
        session_id: impl Into<String>,
        config: DetectorConfig,
        provider: Box<dyn LandmarkProvider>,
        log: Arc<dyn EventLog>,
        evidence: Arc<dyn EvidenceStore>,
    ) -> Result<Self, ProctorError> {
        config.validate()?;
        let session_id = session_id.into();
        info!("Creating proctor detector for session {}", session_id);

        Ok(Self {
            settings: ProviderSettings::from(&config),
            zones: ZoneClassifier::new(config.zone_edge_ratio),
            tracks: FaceTracks::new(config.max_faces),
            presence: PresenceMonitor::new(&config),
            gaze: GazeTracker::new(&config),
            deviation: DeviationDetector::new(&config),
            freeze: FreezeDetector::new(&config),
            tamper: TamperDetector::new(&config),
            rules: RuleAggregator::new(&config, evidence.clone()),
            clock: None,
            session_id,
            config,
            provider,
            log,
            evidence,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Analyze one frame taken at `now` (seconds). With `capture_reference`
    /// set, every tracked face's current pose becomes its new baseline.
    ///
    /// A timestamp earlier than one already processed is clamped to the
    /// latest, so events are stamped with the clock the timers used.
    pub fn process(
        &mut self,
        frame: &VideoFrame,
        now: f64,
        capture_reference: bool,
    ) -> Result<FrameAnalysis, ProctorError> {
        if !now.is_finite() {
            return Err(ProctorError::Timestamp(now));
        }
        frame.validate()?;

        let now = match self.clock {
            Some(latest) if now < latest => {
                debug!(
                    "Session {} frame at {:.3}s is older than {:.3}s; clamped",
                    self.session_id, now, latest
                );
                latest
            }
            _ => now,
        };
        self.clock = Some(now);
        let mut events = Vec::new();

        // Detection pass: presence only
        let boxes = self.provider.face_boxes(frame)?;
        let faces_detected = boxes
            .iter()
            .filter(|b| b.confidence >= self.settings.min_detect_conf)
            .count();
        self.presence.observe(faces_detected, now, &mut events);

        // Landmark pass: per-face tracking
        let meshes: Vec<_> = self
            .provider
            .face_meshes(frame)?
            .into_iter()
            .filter(|m| m.confidence >= self.settings.min_track_conf)
            .take(self.settings.max_faces)
            .collect();

        let mut faces_tracked = 0;
        let mut reference_tags = Vec::new();
        for (face_idx, mesh) in meshes.iter().enumerate() {
            let Some(keypoints) = FaceKeypoints::from_mesh(mesh, frame.width, frame.height) else {
                debug!("Face {} mesh lacks anchor landmarks", face_idx);
                continue;
            };
            let Some(state) = self.tracks.get_or_create(face_idx) else {
                continue;
            };
            faces_tracked += 1;

            if capture_reference {
                events.push(reference::capture_reference(face_idx, state, &keypoints, now));
                reference_tags.push(format!("ref_face{face_idx}"));
            }

            self.deviation.check(face_idx, state, &keypoints, now, &mut events);

            let (x, y) = (keypoints.nose.x, keypoints.nose.y);
            let coarse = self.zones.coarse_zone(x, y, frame.width, frame.height);
            let detailed = self.zones.detailed_zone(x, y, frame.width, frame.height);
            self.gaze.update(face_idx, state, coarse, detailed, now, &mut events);

            self.freeze.update(face_idx, state, keypoints.anchors(), now, &mut events);
        }

        for tag in &reference_tags {
            if let Err(e) = self.evidence.save_snapshot(frame, tag) {
                warn!("Failed to save reference snapshot {}: {}", tag, e);
            }
        }

        self.tamper.check(frame, now, &mut events)?;

        let alerts = self
            .rules
            .apply(&events, frame, now, self.presence.absence_escalated(now));

        for event in &events {
            self.append_log(event);
        }
        for alert in &alerts {
            self.append_alert_log(alert);
        }

        Ok(FrameAnalysis {
            faces_detected,
            faces_tracked,
            events,
            alerts,
        })
    }

    /// Turn a per-frame failure into a logged `ERROR` event. A non-finite
    /// `now` is replaced by the latest processed frame time.
    pub fn record_error(&self, error: &str, now: f64) -> Event {
        metrics::counter!("proctor_frame_errors_total").increment(1);
        let ts = if now.is_finite() {
            now
        } else {
            self.clock.unwrap_or(0.0)
        };
        let event = Event::new(
            ts,
            EventKind::Error {
                error: error.to_string(),
            },
        );
        match serde_json::to_value(&event) {
            Ok(mut record) => {
                if let Value::Object(map) = &mut record {
                    map.insert(
                        "session_id".to_string(),
                        Value::String(self.session_id.clone()),
                    );
                }
                self.write_record(&record);
            }
            Err(e) => warn!("Failed to serialize error event: {}", e),
        }
        event
    }

    /// Forget all per-face state (e.g. when the candidate changes seats)
    pub fn reset_tracking(&mut self) {
        info!("Resetting face tracking for session {}", self.session_id);
        self.tracks.clear();
    }

    /// Number of faces with tracking state
    pub fn tracked_faces(&self) -> usize {
        self.tracks.tracked()
    }

    fn append_log(&self, event: &Event) {
        match serde_json::to_value(event) {
            Ok(record) => self.write_record(&record),
            Err(e) => warn!("Failed to serialize event: {}", e),
        }
    }

    fn append_alert_log(&self, alert: &Alert) {
        match serde_json::to_value(alert) {
            Ok(mut record) => {
                if let Value::Object(map) = &mut record {
                    map.insert("type".to_string(), Value::String("ALERT".to_string()));
                }
                self.write_record(&record);
            }
            Err(e) => warn!("Failed to serialize alert: {}", e),
        }
    }

    fn write_record(&self, record: &Value) {
        if let Err(e) = self.log.append(record) {
            warn!("Failed to append to event log for {}: {}", self.session_id, e);
        }
    }
}
