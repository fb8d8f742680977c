use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use super::state::AppState;
use crate::handler::health::health_handler;
use crate::handler::logs::{get_logs, get_sources, get_stats, store_log, store_logs};
use crate::handler::metrics::metrics_handler;
use crate::handler::query::{analyze, run_query};

/// Builds the full HTTP router for the API surface.
pub fn api_router(state: Arc<AppState>) -> Router {
    let v1 = Router::new()
        .route("/logs", get(get_logs).post(store_log))
        .route("/logs/batch", post(store_logs))
        .route("/logs/sources", get(get_sources))
        .route("/logs/stats", get(get_stats))
        .route("/query", post(run_query))
        .route("/query/analyze", post(analyze))
        .route("/health", get(health_handler));

    Router::new()
        .nest("/api/v1", v1)
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
