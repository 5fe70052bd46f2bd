//! Persistent cache API handlers.

use axum::{extract::State, http::header, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

use appcache_core::CacheStats;

use crate::state::AppState;

/// Error response
#[derive(Debug, Serialize)]
pub struct CacheErrorResponse {
    pub error: String,
}

/// Canonical text of the newest stored manifest
pub async fn get_manifest(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, Json<CacheErrorResponse>)> {
    match state.orchestrator().stored_manifest() {
        Ok(Some(document)) => Ok((
            [(header::CONTENT_TYPE, "text/cache-manifest; charset=utf-8")],
            document.serialize(),
        )),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(CacheErrorResponse {
                error: "No manifest stored yet".to_string(),
            }),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(CacheErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}

/// Persistent cache statistics
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CacheStats>, (StatusCode, Json<CacheErrorResponse>)> {
    state.orchestrator().cache().stats().map(Json).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(CacheErrorResponse {
                error: e.to_string(),
            }),
        )
    })
}
