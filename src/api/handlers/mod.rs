use std::io::ErrorKind;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use crate::error::SessionError;
use crate::ingest::ANALYSIS_FILE;
use crate::lifecycle::SessionManager;
use crate::models::*;

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            detail: detail.into(),
        }),
    )
}

/// Log an internal error and return a sanitized response to the client.
fn internal_error(e: impl std::fmt::Display) -> ApiError {
    tracing::error!("Internal error: {}", e);
    error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

fn not_found() -> ApiError {
    error(StatusCode::NOT_FOUND, "Query not found")
}

fn session_error(e: SessionError) -> ApiError {
    match e {
        SessionError::NotFound(_) => not_found(),
        SessionError::InvalidState { .. } => {
            tracing::warn!("Rejected: {}", e);
            error(StatusCode::CONFLICT, e.to_string())
        }
        SessionError::InvalidRequest(msg) => error(StatusCode::BAD_REQUEST, msg),
        other => internal_error(other),
    }
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Sessions
// ============================================================

pub async fn list_queries(
    State(sessions): State<SessionManager>,
) -> Result<Json<Vec<Query>>, ApiError> {
    sessions
        .db()
        .get_all_queries()
        .map(Json)
        .map_err(internal_error)
}

pub async fn get_query(
    State(sessions): State<SessionManager>,
    Path(id): Path<String>,
) -> Result<Json<Query>, ApiError> {
    sessions
        .db()
        .get_query(&id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(not_found)
}

pub async fn list_summaries(
    State(sessions): State<SessionManager>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Summary>>, ApiError> {
    sessions
        .db()
        .get_summaries_by_query(&id)
        .map(Json)
        .map_err(internal_error)
}

pub async fn start_search(
    State(sessions): State<SessionManager>,
    Json(params): Json<SearchParams>,
) -> Result<Json<Query>, ApiError> {
    sessions.start_search(params).map(Json).map_err(session_error)
}

// ============================================================
// Analysis
// ============================================================

pub async fn start_analysis(
    State(sessions): State<SessionManager>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let query = sessions
        .start_analysis(&request.session_id)
        .map_err(session_error)?;

    Ok(Json(AnalyzeResponse {
        message: "Analysis started".to_string(),
        session_id: query.id,
    }))
}

pub async fn get_analysis(
    State(sessions): State<SessionManager>,
    Path(id): Path<String>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    sessions
        .db()
        .get_query(&id)
        .map_err(internal_error)?
        .ok_or_else(not_found)?;

    let path = sessions.config().session_dir(&id).join(ANALYSIS_FILE);
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Ok(Json(AnalysisResponse::Completed { content })),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Json(AnalysisResponse::Pending)),
        Err(e) => Err(internal_error(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}
