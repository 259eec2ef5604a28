//! Event-to-alert aggregation
//!
//! Groups one frame's events by alert key, gates each key through its
//! cooldown and attaches an evidence snapshot to every alert that passes.

use crate::analysis::{Alert, AlertKey};
use crate::event::{Event, EventKind};
use crate::freeze::FREEZE_ESCALATION_TICKS;
use crate::DetectorConfig;
use alerting::{AlertConfig, AlertManager};
use std::sync::Arc;
use storage::EvidenceStore;
use tracing::{info, warn};
use video_frame::VideoFrame;

/// Alert candidate before throttling
struct Candidate {
    key: AlertKey,
    message: String,
    events: Vec<Event>,
}

/// Turns raw events into throttled, evidenced alerts
pub struct RuleAggregator {
    alerts: AlertManager<AlertKey>,
    evidence: Arc<dyn EvidenceStore>,
}

impl RuleAggregator {
    pub fn new(config: &DetectorConfig, evidence: Arc<dyn EvidenceStore>) -> Self {
        Self {
            alerts: AlertManager::new(AlertConfig {
                cooldown_s: config.alert_cooldown_s,
            }),
            evidence,
        }
    }

    /// Evaluate one frame's events. `absence_escalated` gates the absence
    /// key, since a single empty frame is not yet an alert.
    pub fn apply(
        &mut self,
        events: &[Event],
        frame: &VideoFrame,
        now: f64,
        absence_escalated: bool,
    ) -> Vec<Alert> {
        let mut dispatched = Vec::new();

        for candidate in candidates(events, absence_escalated) {
            if !self.alerts.try_fire(candidate.key, now) {
                continue;
            }

            let snapshot = match self.evidence.save_snapshot(frame, candidate.key.as_str()) {
                Ok(path) => path,
                Err(e) => {
                    warn!("Failed to save {} snapshot: {}", candidate.key.as_str(), e);
                    None
                }
            };

            metrics::counter!("proctor_alerts_dispatched_total", "key" => candidate.key.as_str())
                .increment(1);
            info!("Alert dispatched: {} - {}", candidate.key.as_str(), candidate.message);

            dispatched.push(Alert {
                key: candidate.key,
                message: candidate.message,
                events: candidate.events,
                snapshot,
                ts: now,
            });
        }

        dispatched
    }
}

/// Qualifying events grouped by key, in dispatch order
fn candidates(events: &[Event], absence_escalated: bool) -> Vec<Candidate> {
    let select = |pred: fn(&EventKind) -> bool| -> Vec<Event> {
        events.iter().filter(|e| pred(&e.kind)).cloned().collect()
    };
    let mut out = Vec::new();

    let absence = select(|k| matches!(k, EventKind::AbsenceTick { .. }));
    if absence_escalated && !absence.is_empty() {
        out.push(Candidate {
            key: AlertKey::Absence,
            message: "No face detected".to_string(),
            events: absence,
        });
    }

    let multi = select(|k| matches!(k, EventKind::MultiFace { .. }));
    if let Some(faces) = multi.iter().find_map(|e| match e.kind {
        EventKind::MultiFace { faces } => Some(faces),
        _ => None,
    }) {
        out.push(Candidate {
            key: AlertKey::MultiFace,
            message: format!("{faces} faces detected"),
            events: multi,
        });
    }

    let gaze = select(|k| {
        matches!(
            k,
            EventKind::DwellCritical { .. } | EventKind::FrequentGlance { .. }
        )
    });
    if !gaze.is_empty() {
        out.push(Candidate {
            key: AlertKey::Gaze,
            message: "Gaze away from screen".to_string(),
            events: gaze,
        });
    }

    let pose = select(|k| {
        matches!(
            k,
            EventKind::RefDeviation { .. } | EventKind::CheekIrisDrift { .. }
        )
    });
    if !pose.is_empty() {
        out.push(Candidate {
            key: AlertKey::Pose,
            message: "Head pose deviated from reference".to_string(),
            events: pose,
        });
    }

    let tamper = select(|k| matches!(k, EventKind::TamperDetected { .. }));
    if !tamper.is_empty() {
        out.push(Candidate {
            key: AlertKey::Tamper,
            message: "Camera view obstructed or changed".to_string(),
            events: tamper,
        });
    }

    let freeze = select(|k| matches!(k, EventKind::FreezeTick { .. }));
    let window_escalated = freeze.iter().any(|e| {
        matches!(e.kind, EventKind::FreezeTick { window_ticks, .. } if window_ticks >= FREEZE_ESCALATION_TICKS)
    });
    if freeze.len() >= FREEZE_ESCALATION_TICKS || window_escalated {
        out.push(Candidate {
            key: AlertKey::Freeze,
            message: "Low facial motion observed".to_string(),
            events: freeze,
        });
    }

    out
}
