use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::engine::error::SessionError;
use crate::engine::events::{PublicSessionInfo, SessionListEntry, SessionSnapshot};

use super::app_state::AppState;

/// Format tag stamped on downloaded session exports.
pub const EXPORT_FORMAT: &str = "Tutorboard Session Export";

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let status = match self {
            SessionError::InvalidArgument(_) | SessionError::NameConflict => {
                StatusCode::BAD_REQUEST
            }
            SessionError::NotFound => StatusCode::NOT_FOUND,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

// ── Session endpoints ──────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    // Optional so a missing field maps to our 400, not a deserialization rejection.
    pub host_name: Option<String>,
    pub avatar: Option<String>,
    pub color: Option<String>,
    #[serde(default = "default_public")]
    pub is_public: bool,
    pub session_title: Option<String>,
}

fn default_public() -> bool {
    true
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub message: &'static str,
    pub session: SessionSnapshot,
}

/// POST /api/sessions — create a session with the caller as host.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, SessionError> {
    let session = state.registry.create_session(
        req.host_name.as_deref().unwrap_or(""),
        req.avatar,
        req.color,
        req.is_public,
        req.session_title,
    )?;

    Ok(Json(CreateSessionResponse {
        session_id: session.session_id.clone(),
        message: "Session created successfully",
        session,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSessionRequest {
    pub user_name: Option<String>,
    pub avatar: Option<String>,
    pub color: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSessionResponse {
    pub message: &'static str,
    pub session: SessionSnapshot,
}

/// POST /api/sessions/{id}/join — reserve a name on the roster and get the
/// current state for history replay.
pub async fn join_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(req): Json<JoinSessionRequest>,
) -> Result<Json<JoinSessionResponse>, SessionError> {
    let session = state.registry.join_session(
        &session_id,
        req.user_name.as_deref().unwrap_or(""),
        req.avatar,
        req.color,
    )?;

    Ok(Json(JoinSessionResponse {
        message: "Joined session successfully",
        session,
    }))
}

/// GET /api/sessions/public — sessions visible in the public listing.
pub async fn list_public_sessions(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<PublicSessionInfo>> {
    Json(state.registry.list_public_sessions())
}

/// GET /api/sessions — every live session, public or not.
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<SessionListEntry>> {
    Json(state.registry.list_sessions())
}

/// GET /api/sessions/{id} — full session snapshot.
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSnapshot>, SessionError> {
    Ok(Json(state.registry.snapshot(&session_id)?))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionExport {
    #[serde(flatten)]
    pub session: SessionSnapshot,
    pub exported_at: DateTime<Utc>,
    pub format: &'static str,
}

/// GET /api/sessions/{id}/download — snapshot tagged for export.
pub async fn download_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionExport>, SessionError> {
    let session = state.registry.snapshot(&session_id)?;
    Ok(Json(SessionExport {
        session,
        exported_at: Utc::now(),
        format: EXPORT_FORMAT,
    }))
}
