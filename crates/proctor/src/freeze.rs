//! Low-motion (frozen feed) heuristic

use crate::event::{Event, EventKind};
use crate::landmarks::Point;
use crate::state::FaceTrackState;
use crate::DetectorConfig;

/// Ticks inside the freeze window that escalate to an alert
pub const FREEZE_ESCALATION_TICKS: usize = 10;

/// Flags faces whose anchors barely move between frames
#[derive(Debug, Clone)]
pub struct FreezeDetector {
    motion_thresh_px: f32,
    window_s: f64,
}

impl FreezeDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            motion_thresh_px: config.freeze_motion_thresh_px,
            window_s: config.freeze_window_s,
        }
    }

    /// Compare against the previous frame's anchors and record a tick on low
    /// motion; the first sighting only primes the state
    pub fn update(
        &self,
        face_idx: usize,
        state: &mut FaceTrackState,
        anchors: [Point; 2],
        now: f64,
        events: &mut Vec<Event>,
    ) {
        let previous = state.last_anchors.replace(anchors);

        let cutoff = now - self.window_s;
        while state.freeze_ticks.front().is_some_and(|&t| t < cutoff) {
            state.freeze_ticks.pop_front();
        }

        let Some(previous) = previous else {
            return;
        };

        let max_motion_px = previous
            .iter()
            .zip(anchors.iter())
            .map(|(a, b)| a.distance(b))
            .fold(0.0f32, f32::max);

        if max_motion_px <= self.motion_thresh_px {
            state.freeze_ticks.push_back(now);
            events.push(Event::new(
                now,
                EventKind::FreezeTick {
                    face_idx,
                    max_motion_px,
                    window_ticks: state.freeze_ticks.len(),
                },
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchors(dx: f32) -> [Point; 2] {
        [Point::new(320.0 + dx, 240.0), Point::new(320.0 + dx, 150.0)]
    }

    #[test]
    fn test_first_sighting_primes_only() {
        let detector = FreezeDetector::new(&DetectorConfig::default());
        let mut state = FaceTrackState::default();
        let mut events = Vec::new();

        detector.update(0, &mut state, anchors(0.0), 0.0, &mut events);
        assert!(events.is_empty());
        assert_eq!(state.last_anchors, Some(anchors(0.0)));
    }

    #[test]
    fn test_static_face_ticks_and_moving_face_does_not() {
        let detector = FreezeDetector::new(&DetectorConfig::default());
        let mut state = FaceTrackState::default();
        let mut events = Vec::new();

        detector.update(0, &mut state, anchors(0.0), 0.0, &mut events);
        detector.update(0, &mut state, anchors(1.5), 0.1, &mut events);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0].kind,
            EventKind::FreezeTick { face_idx: 0, window_ticks: 1, .. }
        ));

        // Exactly at the threshold still counts as frozen
        detector.update(0, &mut state, anchors(3.5), 0.2, &mut events);
        assert_eq!(events.len(), 2);

        detector.update(0, &mut state, anchors(10.0), 0.3, &mut events);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_rolling_window_accumulates_and_expires() {
        let detector = FreezeDetector::new(&DetectorConfig::default());
        let mut state = FaceTrackState::default();
        let mut events = Vec::new();

        for i in 0..=10 {
            detector.update(0, &mut state, anchors(0.0), i as f64 * 0.5, &mut events);
        }
        match events.last().map(|e| &e.kind) {
            Some(EventKind::FreezeTick { window_ticks, .. }) => {
                assert_eq!(*window_ticks, FREEZE_ESCALATION_TICKS)
            }
            other => panic!("unexpected {other:?}"),
        }

        // 8s window: ticks before t=12.0 are gone
        events.clear();
        detector.update(0, &mut state, anchors(0.0), 20.0, &mut events);
        assert!(matches!(
            events[0].kind,
            EventKind::FreezeTick { window_ticks: 1, .. }
        ));
    }
}
