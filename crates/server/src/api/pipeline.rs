//! Pipeline API handlers.

use axum::{extract::State, Json};
use std::sync::Arc;

use reelcrawl_core::PipelineStatus;

use crate::state::AppState;

/// Get pipeline status, including the last cycle report.
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<PipelineStatus> {
    Json(state.pipeline().status().await)
}
