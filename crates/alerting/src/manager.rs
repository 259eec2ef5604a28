//! Alert Manager Implementation

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use tracing::{debug, info};

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Minimum seconds between two alerts with the same key (default: 20)
    pub cooldown_s: f64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self { cooldown_s: 20.0 }
    }
}

/// State of an alert key
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertState {
    /// Timestamp (seconds) the key last fired
    pub last_fired: f64,
    /// Number of times fired
    pub fire_count: usize,
}

/// Per-key cooldown gate.
///
/// Timestamps are caller-supplied seconds, so the same frame stream always
/// produces the same alerts. A key that never fired passes immediately.
pub struct AlertManager<K> {
    config: AlertConfig,
    states: HashMap<K, AlertState>,
}

impl<K> AlertManager<K>
where
    K: Hash + Eq + Clone + Debug,
{
    /// Create a new alert manager
    pub fn new(config: AlertConfig) -> Self {
        info!("Creating alert manager with config: {:?}", config);
        Self {
            config,
            states: HashMap::new(),
        }
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    /// Check whether `key` is outside its cooldown at `now`
    pub fn should_fire(&self, key: &K, now: f64) -> bool {
        match self.states.get(key) {
            None => true,
            Some(state) if now - state.last_fired >= self.config.cooldown_s => true,
            Some(state) => {
                debug!(
                    "Alert suppressed: {:?} in cooldown ({:.2}s since last)",
                    key,
                    now - state.last_fired
                );
                false
            }
        }
    }

    /// Record that `key` fired at `now`
    pub fn record_fire(&mut self, key: K, now: f64) {
        let state = self.states.entry(key.clone()).or_insert(AlertState {
            last_fired: now,
            fire_count: 0,
        });
        state.last_fired = now;
        state.fire_count += 1;

        info!("Alert recorded: {:?} (count: {})", key, state.fire_count);
    }

    /// Check and record in one step; returns whether the alert passes
    pub fn try_fire(&mut self, key: K, now: f64) -> bool {
        if self.should_fire(&key, now) {
            self.record_fire(key, now);
            true
        } else {
            false
        }
    }

    pub fn fire_count(&self, key: &K) -> usize {
        self.states.get(key).map_or(0, |s| s.fire_count)
    }

    pub fn last_fired(&self, key: &K) -> Option<f64> {
        self.states.get(key).map(|s| s.last_fired)
    }

    /// Clear all alert states
    pub fn clear(&mut self) {
        self.states.clear();
    }
}

impl<K> Default for AlertManager<K>
where
    K: Hash + Eq + Clone + Debug,
{
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}
