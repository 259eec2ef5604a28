//! Session registry

use crate::pipeline::{PipelineStats, Session, DEFAULT_QUEUE_CAPACITY};
use crate::SessionError;
use proctor::{DetectorConfig, LandmarkProvider, NoLandmarkModel, ProctorDetector};
use std::collections::HashMap;
use std::sync::Arc;
use storage::{FsEvidenceStore, JsonlEventLog, MemoryEventLog, MemoryEvidenceStore};
use tokio::sync::RwLock;
use tracing::info;

/// Longest accepted session id
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Session ids name log and snapshot files, so only `[A-Za-z0-9_-]` is
/// accepted
pub fn validate_session_id(session_id: &str) -> Result<(), SessionError> {
    let valid = !session_id.is_empty()
        && session_id.len() <= MAX_SESSION_ID_LEN
        && session_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(SessionError::InvalidId(session_id.to_string()))
    }
}

/// Builds a fresh landmark provider for each session
pub type ProviderFn = Arc<dyn Fn() -> Box<dyn LandmarkProvider> + Send + Sync>;

/// Builds the detector (and its sinks) for a new session
pub trait DetectorFactory: Send + Sync {
    fn create(&self, session_id: &str, config: DetectorConfig)
        -> Result<ProctorDetector, SessionError>;
}

/// JSON-lines event log and JPEG snapshots under the configured directories
pub struct FsDetectorFactory {
    provider: ProviderFn,
}

impl FsDetectorFactory {
    pub fn new(provider: ProviderFn) -> Self {
        Self { provider }
    }

    /// Factory for deployments without a landmark model
    pub fn without_model() -> Self {
        Self::new(Arc::new(|| {
            Box::new(NoLandmarkModel::default()) as Box<dyn LandmarkProvider>
        }))
    }
}

impl DetectorFactory for FsDetectorFactory {
    fn create(
        &self,
        session_id: &str,
        config: DetectorConfig,
    ) -> Result<ProctorDetector, SessionError> {
        config.validate()?;
        let log = JsonlEventLog::new(&config.log_dir, session_id)?;
        let evidence = FsEvidenceStore::new(&config.snapshot_dir, session_id, config.save_snapshots)?;
        let detector = ProctorDetector::new(
            session_id,
            config,
            (self.provider)(),
            Arc::new(log),
            Arc::new(evidence),
        )?;
        Ok(detector)
    }
}

/// Keeps logs and snapshots in memory; for replays and tests
pub struct MemoryDetectorFactory {
    provider: ProviderFn,
}

impl MemoryDetectorFactory {
    pub fn new(provider: ProviderFn) -> Self {
        Self { provider }
    }
}

impl DetectorFactory for MemoryDetectorFactory {
    fn create(
        &self,
        session_id: &str,
        config: DetectorConfig,
    ) -> Result<ProctorDetector, SessionError> {
        let detector = ProctorDetector::new(
            session_id,
            config,
            (self.provider)(),
            Arc::new(MemoryEventLog::new()),
            Arc::new(MemoryEvidenceStore::new()),
        )?;
        Ok(detector)
    }
}

/// Concurrency-safe map of live sessions
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    factory: Arc<dyn DetectorFactory>,
    default_config: DetectorConfig,
    queue_capacity: usize,
}

impl SessionManager {
    pub fn new(factory: Arc<dyn DetectorFactory>, default_config: DetectorConfig) -> Self {
        info!("Creating session manager");
        Self {
            sessions: RwLock::new(HashMap::new()),
            factory,
            default_config,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Override the per-session frame queue capacity
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn default_config(&self) -> &DetectorConfig {
        &self.default_config
    }

    /// Start a session with `config`; fails if `session_id` is live
    pub async fn create(
        &self,
        session_id: &str,
        config: DetectorConfig,
    ) -> Result<Arc<Session>, SessionError> {
        validate_session_id(session_id)?;
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(session_id) {
            return Err(SessionError::AlreadyExists(session_id.to_string()));
        }
        let session = self.start(session_id, config)?;
        sessions.insert(session_id.to_string(), session.clone());
        metrics::gauge!("proctor_active_sessions").set(sessions.len() as f64);
        Ok(session)
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Existing session, or a new one with the default config
    pub async fn get_or_create(&self, session_id: &str) -> Result<Arc<Session>, SessionError> {
        validate_session_id(session_id)?;
        if let Some(session) = self.get(session_id).await {
            return Ok(session);
        }

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(session_id) {
            return Ok(session.clone());
        }
        let session = self.start(session_id, self.default_config.clone())?;
        sessions.insert(session_id.to_string(), session.clone());
        metrics::gauge!("proctor_active_sessions").set(sessions.len() as f64);
        Ok(session)
    }

    /// Stop the session's worker and remove it; returns its final counters
    pub async fn end(&self, session_id: &str) -> Result<PipelineStats, SessionError> {
        let session = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .remove(session_id)
                .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
            metrics::gauge!("proctor_active_sessions").set(sessions.len() as f64);
            session
        };

        session.stop().await;
        info!("Session {} ended", session_id);
        Ok(session.stats())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stop and remove every session
    pub async fn shutdown_all(&self) {
        let sessions: Vec<_> = self.sessions.write().await.drain().collect();
        metrics::gauge!("proctor_active_sessions").set(0.0);

        info!("Shutting down {} sessions", sessions.len());
        for (_, session) in sessions {
            session.stop().await;
        }
    }

    fn start(&self, session_id: &str, config: DetectorConfig) -> Result<Arc<Session>, SessionError> {
        let detector = self.factory.create(session_id, config)?;
        Ok(Arc::new(Session::spawn(
            session_id,
            detector,
            self.queue_capacity,
        )))
    }
}
