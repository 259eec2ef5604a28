//! Deviation from the reference pose

use crate::event::{Event, EventKind};
use crate::landmarks::FaceKeypoints;
use crate::state::FaceTrackState;
use crate::DetectorConfig;

/// Compares live keypoints to the stored baseline
#[derive(Debug, Clone)]
pub struct DeviationDetector {
    reference_deviation_px: f32,
    cheek_iris_deviation_px: f32,
}

impl DeviationDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            reference_deviation_px: config.reference_deviation_px,
            cheek_iris_deviation_px: config.cheek_iris_deviation_px,
        }
    }

    /// Run both checks; no baseline means no events
    pub fn check(
        &self,
        face_idx: usize,
        state: &FaceTrackState,
        keypoints: &FaceKeypoints,
        now: f64,
        events: &mut Vec<Event>,
    ) {
        let Some(reference) = state.reference.as_ref() else {
            return;
        };

        let deviation_px = reference
            .anchors
            .iter()
            .zip(keypoints.anchors().iter())
            .map(|(r, c)| r.distance(c))
            .fold(0.0f32, f32::max);
        if deviation_px > self.reference_deviation_px {
            events.push(Event::new(now, EventKind::RefDeviation { face_idx, deviation_px }));
        }

        if let (Some((rd1, rd2)), Some((d1, d2))) =
            (reference.cheek_iris, keypoints.cheek_iris_distances())
        {
            if (d1 - rd1).abs() > self.cheek_iris_deviation_px
                || (d2 - rd2).abs() > self.cheek_iris_deviation_px
            {
                events.push(Event::new(now, EventKind::CheekIrisDrift { face_idx, d1, d2 }));
            }
        }
    }
}
