use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use crate::app::state::AppState;

/// GET /api/v1/health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.storage.sources() {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unavailable",
                "message": format!("storage unavailable: {e}"),
            })),
        ),
    }
}
