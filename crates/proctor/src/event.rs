//! Per-frame detector events

use crate::zone::{CoarseZone, DetailedZone};
use serde::{Deserialize, Serialize};

/// Event kinds with their typed payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// No face found by the detection pass
    AbsenceTick { faces: usize },

    /// More than one face found by the detection pass
    MultiFace { faces: usize },

    /// A new reference pose was stored for a face
    ReferenceCaptured { face_idx: usize },

    /// Anchor points moved away from the reference pose
    RefDeviation { face_idx: usize, deviation_px: f32 },

    /// Cheek-to-iris distances drifted from the reference pose
    CheekIrisDrift { face_idx: usize, d1: f32, d2: f32 },

    /// Off-center dwell past the warning threshold
    DwellWarn {
        face_idx: usize,
        zone: CoarseZone,
        seconds: f64,
    },

    /// Off-center dwell past the critical threshold
    DwellCritical {
        face_idx: usize,
        zone: CoarseZone,
        seconds: f64,
    },

    /// Repeated glances at one detailed zone within the window
    FrequentGlance {
        face_idx: usize,
        zone: DetailedZone,
        count: usize,
    },

    /// Low facial motion since the previous frame
    FreezeTick {
        face_idx: usize,
        max_motion_px: f32,
        window_ticks: usize,
    },

    /// Large foreground change in the scene
    TamperDetected { area_ratio: f64 },

    /// A frame could not be processed
    Error { error: String },
}

/// Timestamped detector event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Frame timestamp (seconds)
    pub ts: f64,

    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(ts: f64, kind: EventKind) -> Self {
        Self { ts, kind }
    }

    /// Wire name of the event kind
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            EventKind::AbsenceTick { .. } => "ABSENCE_TICK",
            EventKind::MultiFace { .. } => "MULTI_FACE",
            EventKind::ReferenceCaptured { .. } => "REFERENCE_CAPTURED",
            EventKind::RefDeviation { .. } => "REF_DEVIATION",
            EventKind::CheekIrisDrift { .. } => "CHEEK_IRIS_DRIFT",
            EventKind::DwellWarn { .. } => "DWELL_WARN",
            EventKind::DwellCritical { .. } => "DWELL_CRITICAL",
            EventKind::FrequentGlance { .. } => "FREQUENT_GLANCE",
            EventKind::FreezeTick { .. } => "FREEZE_TICK",
            EventKind::TamperDetected { .. } => "TAMPER_DETECTED",
            EventKind::Error { .. } => "ERROR",
        }
    }
}

/// Round to two decimals for reporting
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_format() {
        let event = Event::new(
            12.5,
            EventKind::FrequentGlance {
                face_idx: 0,
                zone: DetailedZone::TopLeft,
                count: 5,
            },
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({"ts": 12.5, "type": "FREQUENT_GLANCE", "face_idx": 0, "zone": "TL", "count": 5})
        );
        assert_eq!(event.type_name(), "FREQUENT_GLANCE");
    }

    #[test]
    fn test_event_parses_back() {
        let raw = r#"{"ts": 1.0, "type": "MULTI_FACE", "faces": 2}"#;
        let event: Event = serde_json::from_str(raw).unwrap();
        assert_eq!(event.kind, EventKind::MultiFace { faces: 2 });
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.23456), 1.23);
        assert_eq!(round2(0.336), 0.34);
    }
}
