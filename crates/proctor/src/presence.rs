//! Multi-face intrusion and absence monitoring

use crate::event::{Event, EventKind};
use crate::DetectorConfig;

/// Face-count based presence signals
#[derive(Debug, Clone)]
pub struct PresenceMonitor {
    absence_warn_s: f64,
    /// Last time at least one face was detected; primed by the first frame
    last_seen: Option<f64>,
}

impl PresenceMonitor {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            absence_warn_s: config.absence_warn_s,
            last_seen: None,
        }
    }

    /// Record the detection pass result for one frame
    pub fn observe(&mut self, faces: usize, now: f64, events: &mut Vec<Event>) {
        if faces > 0 || self.last_seen.is_none() {
            self.last_seen = Some(now);
        }

        match faces {
            0 => events.push(Event::new(now, EventKind::AbsenceTick { faces: 0 })),
            1 => {}
            n => events.push(Event::new(now, EventKind::MultiFace { faces: n })),
        }
    }

    /// Seconds since a face was last detected
    pub fn absent_for(&self, now: f64) -> f64 {
        self.last_seen.map_or(0.0, |seen| (now - seen).max(0.0))
    }

    /// Whether the current absence has lasted long enough to alert
    pub fn absence_escalated(&self, now: f64) -> bool {
        self.last_seen.is_some() && self.absent_for(now) >= self.absence_warn_s
    }
}
