//! Landmark provider interface and face keypoint extraction
//!
//! Landmark extraction itself is delegated to a [`LandmarkProvider`]. The
//! provider reports dense face meshes (normalized 0-1 coordinates, indexed
//! like a 478-point refined face mesh) and, from a separate and faster
//! detection pass, face bounding boxes.

use crate::{DetectorConfig, ProctorError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::warn;
use video_frame::VideoFrame;

/// Mesh indices of the keypoints the detectors use
pub mod mesh_index {
    pub const NOSE_TIP: usize = 1;
    pub const FOREHEAD: usize = 10;
    pub const LEFT_CHEEK: usize = 234;
    pub const RIGHT_CHEEK: usize = 454;
    pub const LEFT_IRIS: usize = 468;
    pub const RIGHT_IRIS: usize = 473;

    /// Points in a refined mesh (with iris landmarks)
    pub const REFINED_MESH_LEN: usize = 478;
}

/// 2-D point
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Face bounding box from the detection pass (normalized coordinates)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Dense face landmarks from the landmark pass (normalized coordinates)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceMesh {
    pub landmarks: Vec<Point>,
    pub confidence: f32,
}

impl FaceMesh {
    /// Build a refined mesh with only the detector keypoints placed; every
    /// other landmark sits at the nose position
    pub fn from_keypoints(
        nose: Point,
        forehead: Point,
        left_cheek: Point,
        left_iris: Point,
        right_cheek: Point,
        right_iris: Point,
    ) -> Self {
        let mut landmarks = vec![nose; mesh_index::REFINED_MESH_LEN];
        landmarks[mesh_index::NOSE_TIP] = nose;
        landmarks[mesh_index::FOREHEAD] = forehead;
        landmarks[mesh_index::LEFT_CHEEK] = left_cheek;
        landmarks[mesh_index::LEFT_IRIS] = left_iris;
        landmarks[mesh_index::RIGHT_CHEEK] = right_cheek;
        landmarks[mesh_index::RIGHT_IRIS] = right_iris;
        Self {
            landmarks,
            confidence: 1.0,
        }
    }

    /// Landmark `index` scaled to pixel space
    pub fn pixel(&self, index: usize, width: u32, height: u32) -> Option<Point> {
        self.landmarks
            .get(index)
            .map(|p| Point::new(p.x * width as f32, p.y * height as f32))
    }
}

/// Pixel-space keypoints of one face
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceKeypoints {
    pub nose: Point,
    pub forehead: Point,
    /// (left cheek, left iris) and (right cheek, right iris), when the mesh
    /// carries iris landmarks
    pub cheek_iris: Option<[(Point, Point); 2]>,
}

impl FaceKeypoints {
    /// Extract keypoints; `None` if the mesh lacks the nose or forehead
    pub fn from_mesh(mesh: &FaceMesh, width: u32, height: u32) -> Option<Self> {
        let nose = mesh.pixel(mesh_index::NOSE_TIP, width, height)?;
        let forehead = mesh.pixel(mesh_index::FOREHEAD, width, height)?;

        let pair = |cheek, iris| {
            Some((mesh.pixel(cheek, width, height)?, mesh.pixel(iris, width, height)?))
        };
        let cheek_iris = match (
            pair(mesh_index::LEFT_CHEEK, mesh_index::LEFT_IRIS),
            pair(mesh_index::RIGHT_CHEEK, mesh_index::RIGHT_IRIS),
        ) {
            (Some(left), Some(right)) => Some([left, right]),
            _ => None,
        };

        Some(Self {
            nose,
            forehead,
            cheek_iris,
        })
    }

    /// Anchor points used for deviation and motion checks
    pub fn anchors(&self) -> [Point; 2] {
        [self.nose, self.forehead]
    }

    /// Left and right cheek-to-iris distances
    pub fn cheek_iris_distances(&self) -> Option<(f32, f32)> {
        self.cheek_iris
            .map(|[(lc, li), (rc, ri)]| (lc.distance(&li), rc.distance(&ri)))
    }
}

/// Provider tuning derived from the detector configuration
#[derive(Debug, Clone, Copy)]
pub struct ProviderSettings {
    pub max_faces: usize,
    pub min_detect_conf: f32,
    pub min_track_conf: f32,
}

impl From<&DetectorConfig> for ProviderSettings {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            max_faces: config.max_faces,
            min_detect_conf: config.min_detect_conf,
            min_track_conf: config.min_track_conf,
        }
    }
}

/// Face detection and landmark extraction capability
pub trait LandmarkProvider: Send {
    /// Fast face detection pass used for presence monitoring
    fn face_boxes(&mut self, frame: &VideoFrame) -> Result<Vec<FaceBox>, ProctorError>;

    /// Landmark pass used for gaze, pose and motion tracking
    fn face_meshes(&mut self, frame: &VideoFrame) -> Result<Vec<FaceMesh>, ProctorError>;
}

/// Provider used when no landmark model is configured
#[derive(Debug, Default)]
pub struct NoLandmarkModel {
    warned: bool,
}

impl NoLandmarkModel {
    fn warn_once(&mut self) {
        if !self.warned {
            warn!("No landmark model configured. Every frame reports zero faces.");
            self.warned = true;
        }
    }
}

impl LandmarkProvider for NoLandmarkModel {
    fn face_boxes(&mut self, _frame: &VideoFrame) -> Result<Vec<FaceBox>, ProctorError> {
        self.warn_once();
        Ok(Vec::new())
    }

    fn face_meshes(&mut self, _frame: &VideoFrame) -> Result<Vec<FaceMesh>, ProctorError> {
        self.warn_once();
        Ok(Vec::new())
    }
}

/// Per-frame detections for [`ReplayProvider`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Observation {
    pub boxes: Vec<FaceBox>,
    pub meshes: Vec<FaceMesh>,
}

impl Observation {
    /// No faces at all
    pub fn empty() -> Self {
        Self::default()
    }

    /// One face at the given keypoints, seen by both passes
    pub fn single(mesh: FaceMesh) -> Self {
        Self {
            boxes: vec![FaceBox {
                x: 0.3,
                y: 0.2,
                width: 0.4,
                height: 0.5,
                confidence: 0.95,
            }],
            meshes: vec![mesh],
        }
    }
}

/// Replays precomputed detections, one observation per frame
///
/// Once the script is exhausted the last observation repeats. Used for
/// offline re-analysis of recorded sessions and in tests.
#[derive(Debug, Default)]
pub struct ReplayProvider {
    script: VecDeque<Observation>,
    current: Observation,
    boxes_served: bool,
    meshes_served: bool,
}

impl ReplayProvider {
    pub fn new(script: impl IntoIterator<Item = Observation>) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Load the next observation when a new frame starts
    fn begin_pass(&mut self) {
        if !self.boxes_served && !self.meshes_served {
            if let Some(next) = self.script.pop_front() {
                self.current = next;
            }
        }
    }

    /// A frame is done once both passes have read the observation
    fn end_pass(&mut self) {
        if self.boxes_served && self.meshes_served {
            self.boxes_served = false;
            self.meshes_served = false;
        }
    }
}

impl LandmarkProvider for ReplayProvider {
    fn face_boxes(&mut self, _frame: &VideoFrame) -> Result<Vec<FaceBox>, ProctorError> {
        self.begin_pass();
        let boxes = self.current.boxes.clone();
        self.boxes_served = true;
        self.end_pass();
        Ok(boxes)
    }

    fn face_meshes(&mut self, _frame: &VideoFrame) -> Result<Vec<FaceMesh>, ProctorError> {
        self.begin_pass();
        let meshes = self.current.meshes.clone();
        self.meshes_served = true;
        self.end_pass();
        Ok(meshes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh() -> FaceMesh {
        FaceMesh::from_keypoints(
            Point::new(0.5, 0.5),
            Point::new(0.5, 0.3),
            Point::new(0.35, 0.5),
            Point::new(0.42, 0.45),
            Point::new(0.65, 0.5),
            Point::new(0.58, 0.45),
        )
    }

    #[test]
    fn test_keypoints_in_pixel_space() {
        let kp = FaceKeypoints::from_mesh(&mesh(), 200, 100).unwrap();
        assert_eq!(kp.nose, Point::new(100.0, 50.0));
        assert_eq!(kp.forehead, Point::new(100.0, 30.0));

        let (d1, d2) = kp.cheek_iris_distances().unwrap();
        assert!((d1 - d2).abs() < 1e-3);
    }

    #[test]
    fn test_mesh_without_iris_has_no_cheek_iris() {
        let mut m = mesh();
        m.landmarks.truncate(468);
        let kp = FaceKeypoints::from_mesh(&m, 200, 100).unwrap();
        assert!(kp.cheek_iris.is_none());
    }

    #[test]
    fn test_short_mesh_is_rejected() {
        let m = FaceMesh {
            landmarks: vec![Point::default(); 5],
            confidence: 1.0,
        };
        assert!(FaceKeypoints::from_mesh(&m, 200, 100).is_none());
    }

    #[test]
    fn test_replay_serves_one_observation_per_frame() {
        let frame = VideoFrame::filled(4, 4, [0, 0, 0]);
        let mut provider = ReplayProvider::new([Observation::empty(), Observation::single(mesh())]);

        assert!(provider.face_boxes(&frame).unwrap().is_empty());
        assert!(provider.face_meshes(&frame).unwrap().is_empty());

        assert_eq!(provider.face_boxes(&frame).unwrap().len(), 1);
        assert_eq!(provider.face_meshes(&frame).unwrap().len(), 1);

        // Exhausted script repeats the last observation
        assert_eq!(provider.face_boxes(&frame).unwrap().len(), 1);
        assert_eq!(provider.face_meshes(&frame).unwrap().len(), 1);
    }
}
