//! Session Routes

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use session::{PipelineState, PipelineStats, SessionOutput, DEFAULT_POLL_BATCH};
use std::sync::Arc;
use tracing::debug;

use crate::{ApiError, AppState};

/// Upper bound on outputs returned by one poll
const MAX_POLL: usize = 100;

/// Query parameters for frame upload
#[derive(Debug, Deserialize)]
pub struct FrameQuery {
    /// Capture timestamp (seconds); defaults to server uptime
    pub ts: Option<f64>,
    /// Store this frame's pose as the new reference
    #[serde(default)]
    pub capture_reference: bool,
}

/// Response for frame upload
#[derive(Debug, Serialize)]
pub struct FrameResponse {
    pub session_id: String,
    /// False when the session queue was full and the frame was dropped
    pub accepted: bool,
    /// Outputs ready at upload time
    pub outputs: Vec<SessionOutput>,
}

/// Query parameters for event polling
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default = "default_max")]
    pub max: usize,
}

fn default_max() -> usize {
    DEFAULT_POLL_BATCH
}

/// Response for event polling
#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub session_id: String,
    pub state: PipelineState,
    pub outputs: Vec<SessionOutput>,
}

/// Response for session control endpoints
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<PipelineStats>,
}

/// Upload one encoded frame
pub async fn submit_frame(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(params): Query<FrameQuery>,
    body: Bytes,
) -> Result<Json<FrameResponse>, ApiError> {
    let ts = match params.ts {
        Some(ts) if !ts.is_finite() => {
            return Err(ApiError::BadRequest(format!("ts must be a finite number, got {ts}")))
        }
        Some(ts) => ts,
        None => state.start_time.elapsed().as_secs_f64(),
    };
    let timestamp_ns = (ts.max(0.0) * 1e9) as u64;

    // Undecodable uploads never reach the session
    let frame = video_frame::decode(&body, timestamp_ns, 0)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let session = state.sessions.get_or_create(&session_id).await?;
    let accepted = session.submit_with_reference(frame, ts, params.capture_reference);
    if !accepted {
        debug!("Frame for session {} not accepted", session_id);
    }
    let outputs = session.poll_batch(DEFAULT_POLL_BATCH).await;

    Ok(Json(FrameResponse {
        session_id,
        accepted,
        outputs,
    }))
}

/// Poll pending events and alerts
pub async fn poll_events(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(params): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let session = state
        .sessions
        .get(&session_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Session not found: {session_id}")))?;
    let outputs = session.poll_batch(params.max.clamp(1, MAX_POLL)).await;

    Ok(Json(EventsResponse {
        state: session.state(),
        session_id,
        outputs,
    }))
}

/// Capture a reference pose on the next accepted frame
pub async fn request_reference(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let session = state
        .sessions
        .get(&session_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Session not found: {session_id}")))?;
    session.request_reference_capture();

    Ok(Json(StatusResponse {
        status: "armed".to_string(),
        session_id,
        stats: None,
    }))
}

/// Stop and remove a session
pub async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let stats = state.sessions.end(&session_id).await?;

    Ok(Json(StatusResponse {
        status: "stopped".to_string(),
        session_id,
        stats: Some(stats),
    }))
}
