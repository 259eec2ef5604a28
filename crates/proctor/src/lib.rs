//! Interview Proctoring Detectors
//!
//! Per-session analysis of a candidate's webcam feed:
//! - Presence monitoring (absence, additional faces)
//! - Reference pose capture and deviation / cheek-iris drift
//! - Screen-zone dwell and glance frequency
//! - Low-motion (frozen feed) heuristic
//! - Scene tamper detection by background subtraction
//! - Rule aggregation into throttled, evidenced alerts

pub mod analysis;
pub mod config;
pub mod detector;
pub mod deviation;
pub mod event;
pub mod freeze;
pub mod gaze;
pub mod landmarks;
pub mod presence;
pub mod reference;
pub mod rules;
pub mod state;
pub mod tamper;
pub mod zone;

pub use analysis::{Alert, AlertKey, FrameAnalysis};
pub use config::DetectorConfig;
pub use detector::ProctorDetector;
pub use event::{Event, EventKind};
pub use landmarks::{
    FaceBox, FaceKeypoints, FaceMesh, LandmarkProvider, NoLandmarkModel, Observation, Point,
    ReplayProvider,
};
pub use zone::{CoarseZone, DetailedZone, ZoneClassifier};

use thiserror::Error;
use video_frame::FrameError;

/// Proctoring error types
#[derive(Error, Debug)]
pub enum ProctorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid frame: {0}")]
    Frame(#[from] FrameError),

    #[error("Landmark provider failed: {0}")]
    Provider(String),

    #[error("Invalid timestamp: {0}")]
    Timestamp(f64),
}
