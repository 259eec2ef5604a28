//! Reference pose capture

use crate::event::{Event, EventKind};
use crate::landmarks::{FaceKeypoints, Point};
use crate::state::FaceTrackState;
use tracing::info;

/// Baseline of a face's neutral pose
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferencePose {
    /// Nose tip and forehead, pixel space
    pub anchors: [Point; 2],
    /// Left and right cheek-to-iris distances
    pub cheek_iris: Option<(f32, f32)>,
}

impl ReferencePose {
    pub fn from_keypoints(keypoints: &FaceKeypoints) -> Self {
        Self {
            anchors: keypoints.anchors(),
            cheek_iris: keypoints.cheek_iris_distances(),
        }
    }
}

/// Store a new baseline for `face_idx`, replacing any previous one
pub fn capture_reference(
    face_idx: usize,
    state: &mut FaceTrackState,
    keypoints: &FaceKeypoints,
    now: f64,
) -> Event {
    let pose = ReferencePose::from_keypoints(keypoints);
    info!(
        "Reference captured for face {} (cheek-iris baseline: {})",
        face_idx,
        pose.cheek_iris.is_some()
    );
    state.reference = Some(pose);
    Event::new(now, EventKind::ReferenceCaptured { face_idx })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypoints(nose_x: f32) -> FaceKeypoints {
        FaceKeypoints {
            nose: Point::new(nose_x, 240.0),
            forehead: Point::new(nose_x, 150.0),
            cheek_iris: Some([
                (Point::new(250.0, 240.0), Point::new(290.0, 220.0)),
                (Point::new(390.0, 240.0), Point::new(350.0, 220.0)),
            ]),
        }
    }

    #[test]
    fn test_capture_stores_baseline() {
        let mut state = FaceTrackState::default();
        let event = capture_reference(0, &mut state, &keypoints(320.0), 1.0);

        assert_eq!(event.kind, EventKind::ReferenceCaptured { face_idx: 0 });
        let pose = state.reference.unwrap();
        assert_eq!(pose.anchors[0], Point::new(320.0, 240.0));
        let (d1, d2) = pose.cheek_iris.unwrap();
        assert!((d1 - 44.72).abs() < 0.01);
        assert!((d2 - 44.72).abs() < 0.01);
    }

    #[test]
    fn test_capture_overwrites_previous() {
        let mut state = FaceTrackState::default();
        capture_reference(0, &mut state, &keypoints(320.0), 1.0);
        capture_reference(0, &mut state, &keypoints(100.0), 2.0);

        let pose = state.reference.unwrap();
        assert_eq!(pose.anchors[0], Point::new(100.0, 240.0));
    }
}
