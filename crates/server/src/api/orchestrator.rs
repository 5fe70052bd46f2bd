//! Update session API handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use appcache_core::{OrchestratorError, OrchestratorStatus, Status};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to start an update cycle
#[derive(Debug, Default, Deserialize)]
pub struct UpdateRequest {
    /// Ignore cached manifest validators and fetch unconditionally
    #[serde(default)]
    pub force: bool,
}

/// Result of an update request
#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    /// False when a cycle was already running
    pub started: bool,
    pub status: Status,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct OrchestratorErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<OrchestratorErrorResponse>);

fn error_response(err: OrchestratorError) -> ApiError {
    let status = match &err {
        OrchestratorError::InvalidState(_) => StatusCode::CONFLICT,
        OrchestratorError::Manifest(_) => StatusCode::UNPROCESSABLE_ENTITY,
        OrchestratorError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(OrchestratorErrorResponse {
            error: err.to_string(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Get the session status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<OrchestratorStatus> {
    Json(state.orchestrator().snapshot())
}

/// Start an update cycle
pub async fn update(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateRequest>,
) -> Result<Json<UpdateResponse>, ApiError> {
    let orchestrator = state.orchestrator();
    let started = orchestrator.update(request.force).map_err(error_response)?;
    info!(force = request.force, started, "Update requested over API");

    Ok(Json(UpdateResponse {
        started,
        status: orchestrator.status(),
    }))
}

/// Cancel the running cycle
pub async fn abort(State(state): State<Arc<AppState>>) -> Json<OrchestratorStatus> {
    let orchestrator = state.orchestrator();
    orchestrator.abort();
    Json(orchestrator.snapshot())
}

/// Adopt the downloaded generation
pub async fn swap(
    State(state): State<Arc<AppState>>,
) -> Result<Json<OrchestratorStatus>, ApiError> {
    let orchestrator = state.orchestrator();
    orchestrator.swap_cache().map_err(error_response)?;
    Ok(Json(orchestrator.snapshot()))
}
