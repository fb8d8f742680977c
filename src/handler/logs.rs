use std::sync::Arc;

use axum::Json;
use axum::extract::{Query as UrlQuery, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::ApiError;
use crate::app::state::AppState;
use crate::domain::{LogEntry, QueryBuilder};
use crate::storage::StorageStats;

#[derive(Debug, Deserialize)]
pub struct LogsParams {
    limit: Option<usize>,
    from: Option<String>,
    to: Option<String>,
    sources: Option<String>,
    source: Option<String>,
    levels: Option<String>,
    level: Option<String>,
    filter: Option<String>,
}

/// GET /api/v1/logs
pub async fn get_logs(
    State(state): State<Arc<AppState>>,
    UrlQuery(params): UrlQuery<LogsParams>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    let sources = csv_or_single(params.sources.as_deref(), params.source.as_deref());
    let levels = csv_or_single(params.levels.as_deref(), params.level.as_deref());

    let mut builder = QueryBuilder::new()
        .with_limit(params.limit.unwrap_or(100))
        .with_time_range(
            parse_rfc3339(params.from.as_deref()),
            parse_rfc3339(params.to.as_deref()),
        )
        .with_sources(sources)
        .with_levels(levels);
    if let Some(filter) = params.filter {
        builder = builder.with_filter(filter);
    }
    let query = builder.build();

    debug!(?query, "logs request");
    let entries = state.engine.execute(&query)?;
    Ok(Json(entries))
}

/// POST /api/v1/logs
pub async fn store_log(
    State(state): State<Arc<AppState>>,
    Json(entry): Json<LogEntry>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    state.storage.store(entry)?;
    Ok((StatusCode::CREATED, Json(json!({ "status": "ok" }))))
}

/// POST /api/v1/logs/batch
pub async fn store_logs(
    State(state): State<Arc<AppState>>,
    Json(entries): Json<Vec<LogEntry>>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let count = entries.len();
    for entry in entries {
        state.storage.store(entry)?;
    }
    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "ok", "count": count })),
    ))
}

/// GET /api/v1/logs/sources
pub async fn get_sources(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, ApiError> {
    let mut sources = state.storage.sources()?;
    sources.sort();
    Ok(Json(sources))
}

/// GET /api/v1/logs/stats
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StorageStats>, ApiError> {
    Ok(Json(state.storage.stats()?))
}

fn csv_or_single(csv: Option<&str>, single: Option<&str>) -> Vec<String> {
    match (csv, single) {
        (Some(csv), _) if !csv.is_empty() => csv.split(',').map(str::to_owned).collect(),
        (_, Some(single)) if !single.is_empty() => vec![single.to_owned()],
        _ => Vec::new(),
    }
}

/// Invalid timestamps are ignored rather than rejected.
fn parse_rfc3339(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|ts| ts.with_timezone(&Utc))
}
