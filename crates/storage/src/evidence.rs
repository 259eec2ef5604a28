//! Snapshot evidence stores

use crate::StorageError;
use chrono::Utc;
use image::ImageFormat;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};
use video_frame::VideoFrame;

/// Persists frames captured as alert or reference evidence
pub trait EvidenceStore: Send + Sync {
    /// Save `frame` under `tag`; `Ok(None)` when saving is disabled
    fn save_snapshot(&self, frame: &VideoFrame, tag: &str) -> Result<Option<PathBuf>, StorageError>;
}

/// JPEG files named `{session_id}_{timestamp}_{tag}.jpg`
pub struct FsEvidenceStore {
    dir: PathBuf,
    session_id: String,
    enabled: bool,
}

impl FsEvidenceStore {
    pub fn new(
        dir: impl AsRef<Path>,
        session_id: &str,
        enabled: bool,
    ) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        if enabled {
            fs::create_dir_all(&dir)?;
            info!("Saving snapshots to {}", dir.display());
        }
        Ok(Self {
            dir,
            session_id: session_id.to_string(),
            enabled,
        })
    }
}

impl EvidenceStore for FsEvidenceStore {
    fn save_snapshot(&self, frame: &VideoFrame, tag: &str) -> Result<Option<PathBuf>, StorageError> {
        if !self.enabled {
            return Ok(None);
        }

        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3f");
        let path = self
            .dir
            .join(format!("{}_{}_{}.jpg", self.session_id, stamp, tag));

        let img = frame
            .to_rgb_image()
            .map_err(|e| StorageError::Encode(e.to_string()))?;
        img.save_with_format(&path, ImageFormat::Jpeg)
            .map_err(|e| StorageError::Encode(e.to_string()))?;

        debug!("Saved snapshot {}", path.display());
        Ok(Some(path))
    }
}

/// Records snapshot requests without touching the filesystem
#[derive(Default)]
pub struct MemoryEvidenceStore {
    tags: Mutex<Vec<String>>,
}

impl MemoryEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags saved so far, in order
    pub fn tags(&self) -> Vec<String> {
        self.tags.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

impl EvidenceStore for MemoryEvidenceStore {
    fn save_snapshot(&self, frame: &VideoFrame, tag: &str) -> Result<Option<PathBuf>, StorageError> {
        frame
            .validate()
            .map_err(|e| StorageError::Encode(e.to_string()))?;
        let mut tags = self
            .tags
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;
        tags.push(tag.to_string());
        Ok(Some(PathBuf::from(format!("memory://{}/{}", tags.len(), tag))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("proctor-snap-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_fs_store_writes_jpeg() {
        let dir = temp_dir();
        let store = FsEvidenceStore::new(&dir, "sess-9", true).unwrap();
        let frame = VideoFrame::filled(32, 24, [200, 10, 10]);

        let path = store.save_snapshot(&frame, "gaze").unwrap().unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("sess-9_"));
        assert!(name.ends_with("_gaze.jpg"));

        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_disabled_store_saves_nothing() {
        let dir = temp_dir();
        let store = FsEvidenceStore::new(&dir, "s", false).unwrap();
        let frame = VideoFrame::filled(4, 4, [0, 0, 0]);
        assert!(store.save_snapshot(&frame, "tamper").unwrap().is_none());
        assert!(!dir.exists());
    }

    #[test]
    fn test_invalid_frame_is_an_error() {
        let store = MemoryEvidenceStore::new();
        let frame = VideoFrame::new(vec![1, 2, 3], 4, 4, 0, 0);
        assert!(matches!(
            store.save_snapshot(&frame, "x"),
            Err(StorageError::Encode(_))
        ));
        assert!(store.tags().is_empty());
    }

    #[test]
    fn test_memory_store_records_tags() {
        let store = MemoryEvidenceStore::new();
        let frame = VideoFrame::filled(2, 2, [1, 1, 1]);
        store.save_snapshot(&frame, "ref_face0").unwrap();
        store.save_snapshot(&frame, "absence").unwrap();
        assert_eq!(store.tags(), vec!["ref_face0", "absence"]);
    }
}
