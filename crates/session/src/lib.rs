//! Session Pipelines
//!
//! One background worker per interview session: frames are queued without
//! blocking the transport, analyzed strictly in order, and the resulting
//! events and alerts are buffered for polling. The [`SessionManager`] owns
//! the registry of live sessions.

mod manager;
mod pipeline;

pub use manager::{
    validate_session_id, DetectorFactory, FsDetectorFactory, MemoryDetectorFactory, ProviderFn,
    SessionManager, MAX_SESSION_ID_LEN,
};
pub use pipeline::{
    PipelineState, PipelineStats, Session, SessionOutput, DEFAULT_POLL_BATCH,
    DEFAULT_QUEUE_CAPACITY,
};

use thiserror::Error;

/// Session error types
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session already exists: {0}")]
    AlreadyExists(String),

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Invalid session id {0:?}: use 1-128 characters from [A-Za-z0-9_-]")]
    InvalidId(String),

    #[error("Detector setup failed: {0}")]
    Detector(#[from] proctor::ProctorError),

    #[error("Storage setup failed: {0}")]
    Storage(#[from] storage::StorageError),
}
