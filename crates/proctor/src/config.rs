//! Detector configuration

use crate::ProctorError;
use serde::{Deserialize, Serialize};

/// Proctoring detector configuration
///
/// Supplied at session creation and never mutated afterwards. All durations
/// are in seconds, all distances in pixels of the analysed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Maximum number of faces tracked by the landmark pass
    pub max_faces: usize,

    /// Face detection confidence threshold
    pub min_detect_conf: f32,

    /// Landmark tracking confidence threshold
    pub min_track_conf: f32,

    /// Fraction of width/height treated as an edge band
    pub zone_edge_ratio: f32,

    /// Off-center dwell warning threshold
    pub dwell_warn_s: f64,

    /// Off-center dwell critical threshold
    pub dwell_critical_s: f64,

    /// Sliding window for glance counting
    pub glance_window_s: f64,

    /// Glances per detailed zone within the window before flagging
    pub glance_threshold: usize,

    /// Anchor deviation from the reference pose
    pub reference_deviation_px: f32,

    /// Cheek-to-iris distance drift from the reference pose
    pub cheek_iris_deviation_px: f32,

    /// Time without any detected face before absence escalates
    pub absence_warn_s: f64,

    /// Foreground area ratio treated as camera tampering
    pub tamper_area_ratio: f64,

    /// Rolling window for freeze tick accumulation
    pub freeze_window_s: f64,

    /// Anchor motion at or below this counts as a freeze tick
    pub freeze_motion_thresh_px: f32,

    /// Minimum time between two alerts with the same key
    pub alert_cooldown_s: f64,

    /// Evidence snapshot directory
    pub snapshot_dir: String,

    /// Per-session event log directory
    pub log_dir: String,

    /// Enable evidence snapshots
    pub save_snapshots: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_faces: 2,
            min_detect_conf: 0.5,
            min_track_conf: 0.5,
            zone_edge_ratio: 0.3,
            dwell_warn_s: 3.0,
            dwell_critical_s: 5.0,
            glance_window_s: 60.0,
            glance_threshold: 5,
            reference_deviation_px: 30.0,
            cheek_iris_deviation_px: 18.0,
            absence_warn_s: 3.0,
            tamper_area_ratio: 0.33,
            freeze_window_s: 8.0,
            freeze_motion_thresh_px: 2.0,
            alert_cooldown_s: 20.0,
            snapshot_dir: "./data/proctor_snapshots".to_string(),
            log_dir: "./data/proctor_logs".to_string(),
            save_snapshots: true,
        }
    }
}

impl DetectorConfig {
    /// Reject configurations the detectors cannot run with
    pub fn validate(&self) -> Result<(), ProctorError> {
        if self.max_faces == 0 {
            return Err(ProctorError::Config("max_faces must be at least 1".into()));
        }
        for (name, value) in [
            ("min_detect_conf", self.min_detect_conf),
            ("min_track_conf", self.min_track_conf),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ProctorError::Config(format!("{name} must be within [0, 1]")));
            }
        }
        if !(self.zone_edge_ratio > 0.0 && self.zone_edge_ratio < 0.5) {
            return Err(ProctorError::Config(
                "zone_edge_ratio must be within (0, 0.5)".into(),
            ));
        }
        if self.dwell_warn_s > self.dwell_critical_s {
            return Err(ProctorError::Config(
                "dwell_warn_s must not exceed dwell_critical_s".into(),
            ));
        }
        if self.glance_threshold == 0 {
            return Err(ProctorError::Config("glance_threshold must be at least 1".into()));
        }
        if !(self.tamper_area_ratio > 0.0 && self.tamper_area_ratio <= 1.0) {
            return Err(ProctorError::Config(
                "tamper_area_ratio must be within (0, 1]".into(),
            ));
        }
        for (name, value) in [
            ("dwell_warn_s", self.dwell_warn_s),
            ("dwell_critical_s", self.dwell_critical_s),
            ("glance_window_s", self.glance_window_s),
            ("absence_warn_s", self.absence_warn_s),
            ("freeze_window_s", self.freeze_window_s),
            ("alert_cooldown_s", self.alert_cooldown_s),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ProctorError::Config(format!("{name} must be a non-negative duration")));
            }
        }
        for (name, value) in [
            ("reference_deviation_px", self.reference_deviation_px),
            ("cheek_iris_deviation_px", self.cheek_iris_deviation_px),
            ("freeze_motion_thresh_px", self.freeze_motion_thresh_px),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ProctorError::Config(format!("{name} must be a non-negative distance")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(DetectorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_nan_and_negative_thresholds() {
        let config = DetectorConfig {
            dwell_critical_s: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ProctorError::Config(msg)) if msg.contains("dwell_critical_s")));

        for config in [
            DetectorConfig {
                reference_deviation_px: f32::NAN,
                ..Default::default()
            },
            DetectorConfig {
                cheek_iris_deviation_px: -1.0,
                ..Default::default()
            },
            DetectorConfig {
                freeze_motion_thresh_px: f32::INFINITY,
                ..Default::default()
            },
        ] {
            assert!(matches!(config.validate(), Err(ProctorError::Config(_))));
        }
    }

    #[test]
    fn test_rejects_inverted_dwell_thresholds() {
        let config = DetectorConfig {
            dwell_warn_s: 6.0,
            dwell_critical_s: 5.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ProctorError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_faces() {
        let config = DetectorConfig {
            max_faces: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: DetectorConfig =
            serde_json::from_str(r#"{"glance_threshold": 7, "save_snapshots": false}"#).unwrap();
        assert_eq!(config.glance_threshold, 7);
        assert!(!config.save_snapshots);
        assert_eq!(config.max_faces, 2);
    }
}
