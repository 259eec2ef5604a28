//! Video Frame Library for Interview Proctoring
//!
//! Provides the decoded frame type consumed by the proctoring detectors.
//! Supports:
//! - Decoding JPEG/PNG payloads from the transport
//! - Grayscale and RGB image views for analysis and evidence capture
//! - Structural validation so malformed frames are rejected per frame

pub mod frame;

pub use frame::{decode, VideoFrame};

use thiserror::Error;

/// Frame error types
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Failed to decode frame: {0}")]
    Decode(String),

    #[error("Invalid frame dimensions {width}x{height}")]
    Dimensions { width: u32, height: u32 },

    #[error("Frame buffer length {actual} does not match expected {expected}")]
    BufferLength { expected: usize, actual: usize },
}
