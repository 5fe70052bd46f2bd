use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{cache, handlers, middleware::metrics_middleware, orchestrator};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health, config and metrics
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::metrics))
        // Update session
        .route("/status", get(orchestrator::get_status))
        .route("/update", post(orchestrator::update))
        .route("/abort", post(orchestrator::abort))
        .route("/swap", post(orchestrator::swap))
        // Persistent cache
        .route("/manifest", get(cache::get_manifest))
        .route("/cache/stats", get(cache::get_stats))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
