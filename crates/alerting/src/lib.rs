//! Alerting
//!
//! Per-key cooldown gating for proctoring alerts.

mod manager;

pub use manager::{AlertConfig, AlertManager, AlertState};
