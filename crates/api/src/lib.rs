//! Interview Proctoring API Server
//!
//! HTTP transport for the per-session proctoring pipelines: frame upload,
//! event polling, reference capture and session teardown.

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use session::{SessionError, SessionManager};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::FmtSubscriber;

pub mod routes;
pub mod settings;

pub use settings::{LogFormat, LoggingSettings, Settings, SettingsError};

/// Largest accepted frame upload
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Application state shared across handlers
pub struct AppState {
    /// Live sessions
    pub sessions: SessionManager,
    /// Prometheus render handle, when an exporter is installed
    pub metrics: Option<PrometheusHandle>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(sessions: SessionManager, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            sessions,
            metrics,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        }
    }
}

/// Handler errors
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(e) => (StatusCode::BAD_REQUEST, e),
            ApiError::NotFound(e) => (StatusCode::NOT_FOUND, e),
            ApiError::Internal(e) => (StatusCode::INTERNAL_SERVER_ERROR, e),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(_) => ApiError::NotFound(err.to_string()),
            SessionError::AlreadyExists(_)
            | SessionError::InvalidId(_)
            | SessionError::Detector(_) => ApiError::BadRequest(err.to_string()),
            SessionError::Storage(_) => ApiError::Internal(err.to_string()),
        }
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub active_sessions: usize,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/sessions/:id/frames", post(routes::sessions::submit_frame))
        .route("/api/v1/sessions/:id/events", get(routes::sessions::poll_events))
        .route("/api/v1/sessions/:id/reference", post(routes::sessions::request_reference))
        .route("/api/v1/sessions/:id/end", post(routes::sessions::end_session))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(MAX_FRAME_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        active_sessions: state.sessions.len().await,
    })
}

/// Prometheus scrape endpoint
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Result<String, ApiError> {
    state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .ok_or_else(|| ApiError::NotFound("metrics exporter not installed".to_string()))
}

/// Initialize logging
pub fn init_logging(settings: &LoggingSettings) {
    let level = settings.max_level().unwrap_or(tracing::Level::INFO);

    match settings.format {
        LogFormat::Plain => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_target(true)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .expect("Failed to set tracing subscriber");
        }
        LogFormat::Json => {
            let subscriber = FmtSubscriber::builder()
                .json()
                .with_max_level(level)
                .with_target(true)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .expect("Failed to set tracing subscriber");
        }
    }
}

/// Run the server until Ctrl-C, then stop every session
pub async fn run_server(state: Arc<AppState>, addr: &str) -> Result<(), std::io::Error> {
    let app = create_router(state.clone());

    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.sessions.shutdown_all().await;
    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
