//! Event log implementations

use crate::StorageError;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// Sink for structured event and alert records
pub trait EventLog: Send + Sync {
    /// Append one record; records are written in call order
    fn append(&self, record: &Value) -> Result<(), StorageError>;
}

/// JSON-lines file at `{log_dir}/{session_id}.jsonl`, one record per line
pub struct JsonlEventLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlEventLog {
    /// Open (or create) the session log, creating the directory if needed
    pub fn new(log_dir: impl AsRef<Path>, session_id: &str) -> Result<Self, StorageError> {
        let log_dir = log_dir.as_ref();
        fs::create_dir_all(log_dir)?;
        let path = log_dir.join(format!("{session_id}.jsonl"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!("Opened event log at {}", path.display());
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventLog for JsonlEventLog {
    fn append(&self, record: &Value) -> Result<(), StorageError> {
        let line = serde_json::to_string(&stamped(record))?;
        let mut file = self
            .file
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }
}

/// In-memory log with bounded retention
pub struct MemoryEventLog {
    records: Mutex<VecDeque<Value>>,
    max_records: usize,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::with_capacity(100_000)
    }

    pub fn with_capacity(max_records: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            max_records: max_records.max(1),
        }
    }

    /// Snapshot of all retained records, oldest first
    pub fn records(&self) -> Vec<Value> {
        self.records
            .lock()
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }
}

impl Default for MemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog for MemoryEventLog {
    fn append(&self, record: &Value) -> Result<(), StorageError> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;

        // Enforce retention
        while records.len() >= self.max_records {
            records.pop_front();
        }
        records.push_back(stamped(record));
        debug!("Logged record ({} retained)", records.len());
        Ok(())
    }
}

/// Copy of `record` with a wall-clock `logged_at` field added to objects
fn stamped(record: &Value) -> Value {
    let mut record = record.clone();
    if let Value::Object(map) = &mut record {
        map.insert(
            "logged_at".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
    }
    record
}
