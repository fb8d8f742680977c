use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A time range for filtering entries. Either bound may be open.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// True when the entry timestamp lies within the present bounds
    /// (inclusive on both ends).
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        if let Some(from) = self.from {
            if ts < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if ts > to {
                return false;
            }
        }
        true
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }
}

/// Parameters for filtering and retrieving log entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub time_range: TimeRange,

    /// Exact-match source set. Empty means all sources.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,

    /// Case-insensitive level set. Empty means all levels.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub levels: Vec<String>,

    /// Free-text filter, matched case-insensitively against message, source,
    /// level, field keys, and string-valued fields.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub filter: String,

    /// Per-field substring filters. All must match.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub filter_fields: HashMap<String, String>,

    /// Maximum number of results. Zero means unbounded.
    #[serde(default = "default_limit")]
    pub limit: usize,

    #[serde(default = "default_sort_by")]
    pub sort_by: String,

    #[serde(default = "default_sort_order")]
    pub sort_order: String,
}

fn default_limit() -> usize {
    100
}

fn default_sort_by() -> String {
    "timestamp".to_owned()
}

fn default_sort_order() -> String {
    "desc".to_owned()
}

impl Default for Query {
    fn default() -> Self {
        Self {
            time_range: TimeRange::default(),
            sources: Vec::new(),
            levels: Vec::new(),
            filter: String::new(),
            filter_fields: HashMap::new(),
            limit: default_limit(),
            sort_by: default_sort_by(),
            sort_order: default_sort_order(),
        }
    }
}

/// Fluent builder used by the API layer to assemble a [`Query`].
#[derive(Debug, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time_range(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.query.time_range = TimeRange { from, to };
        self
    }

    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.query.sources = sources;
        self
    }

    pub fn with_levels(mut self, levels: Vec<String>) -> Self {
        self.query.levels = levels;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.query.filter = filter.into();
        self
    }

    pub fn with_filter_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.filter_fields.insert(field.into(), value.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.query.limit = limit;
        self
    }

    pub fn with_sort(mut self, by: impl Into<String>, order: impl Into<String>) -> Self {
        self.query.sort_by = by.into();
        self.query.sort_order = order.into();
        self
    }

    pub fn build(self) -> Query {
        self.query
    }
}

/// Analysis type names accepted on the wire.
pub const ANALYSIS_COUNT: &str = "count";
pub const ANALYSIS_FREQUENCY: &str = "frequency";
pub const ANALYSIS_TIME_SERIES: &str = "time_series";
pub const ANALYSIS_PATTERNS: &str = "patterns";
pub const ANALYSIS_CORRELATION: &str = "correlation";

/// Parameters for an aggregate analysis over matching entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(rename = "type")]
    pub analysis_type: String,

    #[serde(default)]
    pub time_range: TimeRange,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub levels: Vec<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub filter: String,

    /// Grouping key for frequency analysis: `source`, `level`, or a field
    /// name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group_by: String,

    /// Bucket size for time series analysis: minute, hour, day, or month.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interval: String,

    #[serde(default)]
    pub pattern_config: PatternConfig,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub correlation_fields: Vec<String>,
}

/// Normalization switches for pattern analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternConfig {
    #[serde(default)]
    pub replace_numbers: bool,
    #[serde(default)]
    pub replace_ips: bool,
    #[serde(default)]
    pub replace_uuids: bool,
    /// Patterns seen fewer times than this are dropped. Zero keeps all.
    #[serde(default)]
    pub min_count: usize,
}

/// Results of an analysis; only the section matching the type is populated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(rename = "type")]
    pub analysis_type: String,

    pub time_range: TimeRange,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<HashMap<String, u64>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_series: Option<HashMap<String, u64>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Vec<Pattern>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<HashMap<String, HashMap<String, u64>>>,
}

/// A message template produced by normalizing variable runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pattern {
    pub pattern: String,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn default_query_has_standard_defaults() {
        let q = Query::default();
        assert_eq!(q.limit, 100);
        assert_eq!(q.sort_by, "timestamp");
        assert_eq!(q.sort_order, "desc");
        assert!(q.time_range.is_unbounded());
    }

    #[test]
    fn time_range_bounds_are_inclusive() {
        let from = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let range = TimeRange {
            from: Some(from),
            to: Some(to),
        };
        assert!(range.contains(from));
        assert!(range.contains(to));
        assert!(!range.contains(from - chrono::Duration::seconds(1)));
        assert!(!range.contains(to + chrono::Duration::seconds(1)));
    }

    #[test]
    fn builder_assembles_query() {
        let q = QueryBuilder::new()
            .with_sources(vec!["auth".into()])
            .with_levels(vec!["warn".into()])
            .with_filter("timeout")
            .with_filter_field("host", "h1")
            .with_limit(5)
            .with_sort("timestamp", "asc")
            .build();
        assert_eq!(q.sources, vec!["auth"]);
        assert_eq!(q.levels, vec!["warn"]);
        assert_eq!(q.filter, "timeout");
        assert_eq!(q.filter_fields.get("host").map(String::as_str), Some("h1"));
        assert_eq!(q.limit, 5);
        assert_eq!(q.sort_order, "asc");
    }

    #[test]
    fn analysis_deserializes_wire_shape() {
        let analysis: Analysis = serde_json::from_str(
            r#"{"type":"frequency","group_by":"level","levels":["info"]}"#,
        )
        .unwrap();
        assert_eq!(analysis.analysis_type, ANALYSIS_FREQUENCY);
        assert_eq!(analysis.group_by, "level");
        assert_eq!(analysis.levels, vec!["info"]);
    }
}
