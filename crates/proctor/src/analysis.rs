//! Per-frame analysis results and alerts

use crate::event::Event;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Semantic alert keys; each key has its own cooldown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKey {
    /// Candidate left the frame
    Absence,

    /// Another person in view
    MultiFace,

    /// Sustained or repeated off-screen gaze
    Gaze,

    /// Head pose drifted from the reference
    Pose,

    /// Camera obstructed or scene changed
    Tamper,

    /// Suspiciously static face
    Freeze,
}

impl AlertKey {
    /// Stable name, also used as the evidence snapshot tag
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKey::Absence => "absence",
            AlertKey::MultiFace => "multi_face",
            AlertKey::Gaze => "gaze",
            AlertKey::Pose => "pose",
            AlertKey::Tamper => "tamper",
            AlertKey::Freeze => "freeze",
        }
    }
}

/// Throttled alert wrapping the events that triggered it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub key: AlertKey,
    pub message: String,
    pub events: Vec<Event>,
    /// Evidence snapshot; `None` when disabled or the write failed
    pub snapshot: Option<PathBuf>,
    pub ts: f64,
}

/// Complete detector output for one frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameAnalysis {
    /// Faces found by the detection pass
    pub faces_detected: usize,

    /// Faces tracked by the landmark pass
    pub faces_tracked: usize,

    /// All raw events, pre-throttle
    pub events: Vec<Event>,

    /// Alerts that passed the cooldown
    pub alerts: Vec<Alert>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names_match_serde() {
        for key in [AlertKey::Absence, AlertKey::MultiFace, AlertKey::Freeze] {
            let json = serde_json::to_string(&key).unwrap();
            assert_eq!(json, format!("\"{}\"", key.as_str()));
        }
    }
}
