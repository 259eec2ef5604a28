//! Storage Layer
//!
//! Per-session persistence: an append-only JSON-lines event log and a
//! snapshot directory of JPEG evidence. Both sit behind traits so the
//! detector can run against in-memory stores in tests.

mod event_log;
mod evidence;

pub use event_log::{EventLog, JsonlEventLog, MemoryEventLog};
pub use evidence::{EvidenceStore, FsEvidenceStore, MemoryEvidenceStore};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Image encoding error: {0}")]
    Encode(String),
    #[error("Lock error: {0}")]
    Lock(String),
}
