//! Per-face tracking state

use crate::landmarks::Point;
use crate::reference::ReferencePose;
use crate::zone::{CoarseZone, DetailedZone};
use std::collections::{HashMap, VecDeque};

/// Active coarse-zone dwell timer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneTimer {
    pub zone: CoarseZone,
    pub since: f64,
}

/// Face state (tracked over time)
#[derive(Debug, Clone, Default)]
pub struct FaceTrackState {
    /// Baseline captured on request
    pub reference: Option<ReferencePose>,

    /// At most one active dwell timer
    pub dwell: Option<ZoneTimer>,

    /// Glance timestamps per off-center detailed zone
    pub glances: HashMap<DetailedZone, VecDeque<f64>>,

    /// Anchors seen on the previous frame
    pub last_anchors: Option<[Point; 2]>,

    /// Freeze tick timestamps within the freeze window
    pub freeze_ticks: VecDeque<f64>,
}

impl FaceTrackState {
    /// Glance count currently held for a zone
    pub fn glance_count(&self, zone: DetailedZone) -> usize {
        self.glances.get(&zone).map_or(0, VecDeque::len)
    }
}

/// Face states keyed by face index, bounded by `max_faces`
#[derive(Debug, Clone)]
pub struct FaceTracks {
    faces: Vec<Option<FaceTrackState>>,
}

impl FaceTracks {
    pub fn new(max_faces: usize) -> Self {
        Self {
            faces: vec![None; max_faces],
        }
    }

    /// State for `face_idx`, created on first sighting; `None` past `max_faces`
    pub fn get_or_create(&mut self, face_idx: usize) -> Option<&mut FaceTrackState> {
        self.faces
            .get_mut(face_idx)
            .map(|slot| slot.get_or_insert_with(FaceTrackState::default))
    }

    pub fn get(&self, face_idx: usize) -> Option<&FaceTrackState> {
        self.faces.get(face_idx).and_then(Option::as_ref)
    }

    /// Number of faces seen at least once
    pub fn tracked(&self) -> usize {
        self.faces.iter().filter(|f| f.is_some()).count()
    }

    pub fn clear(&mut self) {
        self.faces.iter_mut().for_each(|f| *f = None);
    }
}
