//! Dwell and glance tracking
//!
//! Coarse-zone dwell catches a single sustained excursion (staring at a
//! phone); detailed-zone glance counting catches repeated brief excursions
//! (checking notes).

use crate::event::{round2, Event, EventKind};
use crate::state::{FaceTrackState, ZoneTimer};
use crate::zone::{CoarseZone, DetailedZone};
use crate::DetectorConfig;
use std::collections::VecDeque;

/// Per-face dwell timers and glance frequency windows
#[derive(Debug, Clone)]
pub struct GazeTracker {
    dwell_warn_s: f64,
    dwell_critical_s: f64,
    glance_window_s: f64,
    glance_threshold: usize,
}

impl GazeTracker {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            dwell_warn_s: config.dwell_warn_s,
            dwell_critical_s: config.dwell_critical_s,
            glance_window_s: config.glance_window_s,
            glance_threshold: config.glance_threshold,
        }
    }

    /// Update both trackers for one face on one frame
    pub fn update(
        &self,
        face_idx: usize,
        state: &mut FaceTrackState,
        coarse: CoarseZone,
        detailed: DetailedZone,
        now: f64,
        events: &mut Vec<Event>,
    ) {
        if let Some(event) = self.update_dwell(face_idx, state, coarse, now) {
            events.push(event);
        }
        if let Some(event) = self.update_glances(face_idx, state, detailed, now) {
            events.push(event);
        }
    }

    fn update_dwell(
        &self,
        face_idx: usize,
        state: &mut FaceTrackState,
        zone: CoarseZone,
        now: f64,
    ) -> Option<Event> {
        let timer = match state.dwell {
            Some(timer) if timer.zone == zone => timer,
            _ => {
                let timer = ZoneTimer { zone, since: now };
                state.dwell = Some(timer);
                timer
            }
        };

        if zone == CoarseZone::Center {
            return None;
        }

        let dwell = now - timer.since;
        let seconds = round2(dwell);
        if dwell > self.dwell_critical_s {
            Some(Event::new(now, EventKind::DwellCritical { face_idx, zone, seconds }))
        } else if dwell > self.dwell_warn_s {
            Some(Event::new(now, EventKind::DwellWarn { face_idx, zone, seconds }))
        } else {
            None
        }
    }

    fn update_glances(
        &self,
        face_idx: usize,
        state: &mut FaceTrackState,
        zone: DetailedZone,
        now: f64,
    ) -> Option<Event> {
        if zone != DetailedZone::Center {
            state.glances.entry(zone).or_default().push_back(now);
        }

        let cutoff = now - self.glance_window_s;
        for times in state.glances.values_mut() {
            prune(times, cutoff);
        }
        state.glances.retain(|_, times| !times.is_empty());

        if zone == DetailedZone::Center {
            return None;
        }

        let count = state.glance_count(zone);
        (count >= self.glance_threshold)
            .then(|| Event::new(now, EventKind::FrequentGlance { face_idx, zone, count }))
    }
}

/// Drop timestamps older than `cutoff`; timestamps are ordered
fn prune(times: &mut VecDeque<f64>, cutoff: f64) {
    while times.front().is_some_and(|&t| t < cutoff) {
        times.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> GazeTracker {
        GazeTracker::new(&DetectorConfig::default())
    }

    fn step(
        tracker: &GazeTracker,
        state: &mut FaceTrackState,
        coarse: CoarseZone,
        detailed: DetailedZone,
        now: f64,
    ) -> Vec<Event> {
        let mut events = Vec::new();
        tracker.update(0, state, coarse, detailed, now, &mut events);
        events
    }

    fn kinds(events: &[Event]) -> Vec<&'static str> {
        events.iter().map(Event::type_name).collect()
    }

    #[test]
    fn test_dwell_warn_then_critical() {
        let tracker = tracker();
        let mut state = FaceTrackState::default();

        let events = step(&tracker, &mut state, CoarseZone::Left, DetailedZone::Center, 0.0);
        assert!(events.is_empty());

        let events = step(&tracker, &mut state, CoarseZone::Left, DetailedZone::Center, 3.0);
        assert!(events.is_empty(), "exactly at warn threshold is not a warning");

        let events = step(&tracker, &mut state, CoarseZone::Left, DetailedZone::Center, 4.0);
        assert_eq!(kinds(&events), vec!["DWELL_WARN"]);

        let events = step(&tracker, &mut state, CoarseZone::Left, DetailedZone::Center, 5.0);
        assert_eq!(kinds(&events), vec!["DWELL_WARN"]);

        let events = step(&tracker, &mut state, CoarseZone::Left, DetailedZone::Center, 5.5);
        assert_eq!(
            events[0].kind,
            EventKind::DwellCritical {
                face_idx: 0,
                zone: CoarseZone::Left,
                seconds: 5.5
            }
        );
    }

    #[test]
    fn test_dwell_resets_on_zone_change() {
        let tracker = tracker();
        let mut state = FaceTrackState::default();

        step(&tracker, &mut state, CoarseZone::Left, DetailedZone::Center, 0.0);
        step(&tracker, &mut state, CoarseZone::Left, DetailedZone::Center, 4.0);

        // Moving to another off-center zone restarts the timer
        let events = step(&tracker, &mut state, CoarseZone::Right, DetailedZone::Center, 4.5);
        assert!(events.is_empty());
        assert_eq!(
            state.dwell,
            Some(ZoneTimer {
                zone: CoarseZone::Right,
                since: 4.5
            })
        );

        let events = step(&tracker, &mut state, CoarseZone::Right, DetailedZone::Center, 8.0);
        assert_eq!(kinds(&events), vec!["DWELL_WARN"]);
    }

    #[test]
    fn test_center_never_dwells() {
        let tracker = tracker();
        let mut state = FaceTrackState::default();
        step(&tracker, &mut state, CoarseZone::Center, DetailedZone::Center, 0.0);
        let events = step(&tracker, &mut state, CoarseZone::Center, DetailedZone::Center, 100.0);
        assert!(events.is_empty());
    }

    #[test]
    fn test_frequent_glance_level_triggered() {
        let tracker = tracker();
        let mut state = FaceTrackState::default();

        for i in 0..4 {
            let events = step(&tracker, &mut state, CoarseZone::Center, DetailedZone::TopLeft, i as f64);
            assert!(events.is_empty());
        }

        let events = step(&tracker, &mut state, CoarseZone::Center, DetailedZone::TopLeft, 4.0);
        assert_eq!(
            events[0].kind,
            EventKind::FrequentGlance {
                face_idx: 0,
                zone: DetailedZone::TopLeft,
                count: 5
            }
        );

        // Keeps firing while the count stays at or above the threshold
        let events = step(&tracker, &mut state, CoarseZone::Center, DetailedZone::TopLeft, 5.0);
        assert_eq!(kinds(&events), vec!["FREQUENT_GLANCE"]);
    }

    #[test]
    fn test_glance_zones_are_independent() {
        let tracker = tracker();
        let mut state = FaceTrackState::default();
        let mut fired = Vec::new();

        for i in 0..5 {
            let t = i as f64 * 2.0;
            fired.extend(step(&tracker, &mut state, CoarseZone::Center, DetailedZone::TopLeft, t));
            fired.extend(step(&tracker, &mut state, CoarseZone::Center, DetailedZone::TopRight, t + 1.0));
        }

        let zones: Vec<_> = fired
            .iter()
            .filter_map(|e| match e.kind {
                EventKind::FrequentGlance { zone, .. } => Some(zone),
                _ => None,
            })
            .collect();
        assert_eq!(zones, vec![DetailedZone::TopLeft, DetailedZone::TopRight]);
    }

    #[test]
    fn test_glance_window_pruned() {
        let tracker = tracker();
        let mut state = FaceTrackState::default();

        for i in 0..4 {
            step(&tracker, &mut state, CoarseZone::Center, DetailedZone::Bottom, i as f64);
        }
        step(&tracker, &mut state, CoarseZone::Center, DetailedZone::Left, 30.0);

        // Any later call prunes every zone's list, including untouched ones
        step(&tracker, &mut state, CoarseZone::Center, DetailedZone::Center, 63.5);
        assert_eq!(state.glance_count(DetailedZone::Bottom), 0);
        assert_eq!(state.glance_count(DetailedZone::Left), 1);

        let cutoff = 63.5 - 60.0;
        assert!(state.glances.values().flatten().all(|&t| t >= cutoff));

        // Old glances no longer count toward the threshold
        let events = step(&tracker, &mut state, CoarseZone::Center, DetailedZone::Bottom, 64.0);
        assert!(events.is_empty());
    }
}
