use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::ApiError;
use crate::app::state::AppState;
use crate::domain::{Analysis, AnalysisResult, LogEntry, QueryBuilder};
use crate::error::Error;

#[derive(Debug, Default, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    filter: String,
    #[serde(default)]
    limit: usize,
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: String,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    levels: Vec<String>,
    #[serde(default)]
    sort_by: String,
    #[serde(default)]
    sort_order: String,
}

/// POST /api/v1/query
pub async fn run_query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    let mut builder = QueryBuilder::new();

    // A filter of the form source:<v> or level:<v> routes to the matching
    // set instead of the free-text filter.
    if !request.filter.is_empty() {
        if let Some(source) = request.filter.strip_prefix("source:") {
            builder = builder.with_sources(vec![source.to_owned()]);
        } else if let Some(level) = request.filter.strip_prefix("level:") {
            builder = builder.with_levels(vec![level.to_owned()]);
        } else {
            builder = builder.with_filter(request.filter.clone());
        }
    }

    if !request.sources.is_empty() {
        builder = builder.with_sources(request.sources);
    }
    if !request.levels.is_empty() {
        builder = builder.with_levels(request.levels);
    }

    let from = parse_bound(&request.from, "from")?;
    let to = parse_bound(&request.to, "to")?;
    if from.is_some() || to.is_some() {
        builder = builder.with_time_range(from, to);
    }

    if !request.sort_by.is_empty() && !request.sort_order.is_empty() {
        builder = builder.with_sort(request.sort_by, request.sort_order);
    }
    if request.limit > 0 {
        builder = builder.with_limit(request.limit);
    }

    let entries = state.engine.execute(&builder.build())?;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    analysis: Analysis,
}

/// POST /api/v1/query/analyze
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalysisResult>, ApiError> {
    let result = state.engine.analyze(&request.analysis)?;
    Ok(Json(result))
}

fn parse_bound(value: &str, name: &str) -> Result<Option<DateTime<Utc>>, ApiError> {
    if value.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|ts| Some(ts.with_timezone(&Utc)))
        .map_err(|e| ApiError(Error::InvalidArgument(format!("invalid '{name}' timestamp: {e}"))))
}
