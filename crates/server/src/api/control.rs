//! Operator command handlers.
//!
//! The requesting chat is passed explicitly and must be authorized in the
//! repository; answers go both to the HTTP caller and to that chat.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use reelcrawl_core::{ControlError, FileStatus, StateReport};

use super::handlers::ErrorResponse;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Identifies the chat issuing a command.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub chat: i64,
}

#[derive(Debug, Serialize)]
pub struct SwitchResponse {
    pub file_id: i64,
    pub status: FileStatus,
}

#[derive(Debug, Serialize)]
pub struct ForceCheckResponse {
    pub offset: u64,
    /// Name of the item found at the offset, if any.
    pub item: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Crawl offset and not-ready files.
pub async fn get_state(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChatRequest>,
) -> Result<Json<StateReport>, impl IntoResponse> {
    state
        .control()
        .state(query.chat)
        .await
        .map(Json)
        .map_err(error_response)
}

/// Flip a file between Converting and Ready.
pub async fn switch_status(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<i64>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<SwitchResponse>, impl IntoResponse> {
    state
        .control()
        .switch_status(file_id, request.chat)
        .await
        .map(|status| Json(SwitchResponse { file_id, status }))
        .map_err(error_response)
}

/// Check one offset now and dispatch it if accepted.
pub async fn force_check(
    State(state): State<Arc<AppState>>,
    Path(offset): Path<u64>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ForceCheckResponse>, impl IntoResponse> {
    state
        .control()
        .force_check(offset, request.chat)
        .await
        .map(|item| Json(ForceCheckResponse { offset, item }))
        .map_err(error_response)
}

fn error_response(e: ControlError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        ControlError::Unauthorized => StatusCode::FORBIDDEN,
        ControlError::FileNotFound(_) => StatusCode::NOT_FOUND,
        ControlError::InvalidState { .. } => StatusCode::CONFLICT,
        ControlError::Repository(_) | ControlError::Crawl(_) => {
            error!(error = %e, "Operator command failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}
