use super::state::AppState;
use crate::error::CoachError;
use crate::session::{SessionState, SessionStats, TranscriptEntry};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: Option<Uuid>,
    pub status: SessionState,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub status: SessionState,
    pub message: String,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(err: &CoachError) -> Response {
    let status = match err {
        CoachError::Permission(_) => StatusCode::FORBIDDEN,
        CoachError::Connection(_) => StatusCode::BAD_GATEWAY,
        CoachError::SessionActive(_) => StatusCode::CONFLICT,
        CoachError::Transport(_) | CoachError::Decode(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /coach/session/start
/// Start a voice coaching session
pub async fn start_session(State(state): State<AppState>) -> impl IntoResponse {
    info!("Starting voice coaching session");

    // Run on its own task so a dropped request cannot abandon a half-open session
    let controller = state.controller.clone();
    let result = match tokio::spawn(async move { controller.start().await }).await {
        Ok(result) => result,
        Err(e) => {
            error!("Start task failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Start task failed: {}", e),
                }),
            )
                .into_response();
        }
    };

    if let Err(e) = result {
        error!("Failed to start session: {}", e);
        return error_response(&e);
    }

    let stats = state.controller.stats().await;
    let message = match stats.state {
        SessionState::Active => "Voice coaching session started".to_string(),
        other => format!("Session was stopped before it opened ({})", other),
    };

    (
        StatusCode::OK,
        Json(StartSessionResponse {
            session_id: stats.session_id,
            status: stats.state,
            message,
        }),
    )
        .into_response()
}

/// POST /coach/session/stop
/// Stop the current session (no-op when nothing is running)
pub async fn stop_session(State(state): State<AppState>) -> impl IntoResponse {
    info!("Stopping voice coaching session");

    if let Err(e) = state.controller.stop().await {
        error!("Failed to stop session: {}", e);
        return error_response(&e);
    }

    let stats = state.controller.stats().await;

    (
        StatusCode::OK,
        Json(StopSessionResponse {
            status: stats.state,
            message: "Session stopped".to_string(),
            stats,
        }),
    )
        .into_response()
}

/// GET /coach/session/status
/// Get state and counters of the current session
pub async fn get_session_status(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.controller.stats().await;
    (StatusCode::OK, Json(stats))
}

/// GET /coach/session/transcript
/// Get the transcript accumulated so far
pub async fn get_session_transcript(State(state): State<AppState>) -> impl IntoResponse {
    let transcript: Vec<TranscriptEntry> = state.controller.transcript().await;
    (StatusCode::OK, Json(transcript))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
