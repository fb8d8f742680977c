use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;

use crate::domain::LogEntry;
use crate::error::{Error, Result};

/// Decides whether an entry continues through the pipeline.
pub trait Filter: Send + Sync {
    /// Returns true when the entry passes, false to drop it.
    fn apply(&self, entry: &LogEntry) -> bool;
}

/// Includes or excludes entries by level.
pub struct LevelFilter {
    levels: HashSet<String>,
    include: bool,
}

impl LevelFilter {
    pub fn new(levels: &[&str], include: bool) -> Self {
        Self {
            levels: levels.iter().map(|l| l.to_lowercase()).collect(),
            include,
        }
    }
}

impl Filter for LevelFilter {
    fn apply(&self, entry: &LogEntry) -> bool {
        if entry.level.is_empty() {
            // Unleveled entries only pass an exclusion filter.
            return !self.include;
        }
        self.levels.contains(&entry.level.to_lowercase()) == self.include
    }
}

/// Matches the message against a regular expression.
pub struct RegexFilter {
    pattern: Regex,
    include: bool,
}

impl RegexFilter {
    pub fn new(pattern: &str, include: bool) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| Error::InvalidArgument(format!("invalid filter pattern: {e}")))?;
        Ok(Self { pattern, include })
    }
}

impl Filter for RegexFilter {
    fn apply(&self, entry: &LogEntry) -> bool {
        self.pattern.is_match(&entry.message) == self.include
    }
}

/// Keeps entries inside a time window. Either bound may be open.
pub struct TimeRangeFilter {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

impl TimeRangeFilter {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to }
    }
}

impl Filter for TimeRangeFilter {
    fn apply(&self, entry: &LogEntry) -> bool {
        if let Some(from) = self.from {
            if entry.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if entry.timestamp > to {
                return false;
            }
        }
        true
    }
}

/// Includes or excludes entries by exact source.
pub struct SourceFilter {
    sources: HashSet<String>,
    include: bool,
}

impl SourceFilter {
    pub fn new(sources: &[&str], include: bool) -> Self {
        Self {
            sources: sources.iter().map(|s| (*s).to_owned()).collect(),
            include,
        }
    }
}

impl Filter for SourceFilter {
    fn apply(&self, entry: &LogEntry) -> bool {
        self.sources.contains(&entry.source) == self.include
    }
}

/// Matches a named field by substring (or exactly).
pub struct FieldFilter {
    field: String,
    value: String,
    exact: bool,
}

impl FieldFilter {
    pub fn new(field: impl Into<String>, value: impl Into<String>, exact: bool) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            exact,
        }
    }
}

impl Filter for FieldFilter {
    fn apply(&self, entry: &LogEntry) -> bool {
        let Some(value) = entry.fields.get(&self.field) else {
            return false;
        };
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if self.exact {
            text == self.value
        } else {
            text.contains(&self.value)
        }
    }
}

/// Passes only when every inner filter passes.
pub struct AllFilter {
    filters: Vec<Arc<dyn Filter>>,
}

impl AllFilter {
    pub fn new(filters: Vec<Arc<dyn Filter>>) -> Self {
        Self { filters }
    }
}

impl Filter for AllFilter {
    fn apply(&self, entry: &LogEntry) -> bool {
        self.filters.iter().all(|f| f.apply(entry))
    }
}

/// Passes when at least one inner filter passes.
pub struct AnyFilter {
    filters: Vec<Arc<dyn Filter>>,
}

impl AnyFilter {
    pub fn new(filters: Vec<Arc<dyn Filter>>) -> Self {
        Self { filters }
    }
}

impl Filter for AnyFilter {
    fn apply(&self, entry: &LogEntry) -> bool {
        self.filters.iter().any(|f| f.apply(entry))
    }
}

/// Inverts an inner filter.
pub struct NotFilter {
    inner: Arc<dyn Filter>,
}

impl NotFilter {
    pub fn new(inner: Arc<dyn Filter>) -> Self {
        Self { inner }
    }
}

impl Filter for NotFilter {
    fn apply(&self, entry: &LogEntry) -> bool {
        !self.inner.apply(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(source: &str, level: &str, message: &str) -> LogEntry {
        LogEntry::new(source, message).set_level(level)
    }

    #[test]
    fn level_filter_include_and_exclude() {
        let include = LevelFilter::new(&["error", "warn"], true);
        assert!(include.apply(&entry("s", "ERROR", "m")));
        assert!(!include.apply(&entry("s", "info", "m")));
        assert!(!include.apply(&entry("s", "", "m")));

        let exclude = LevelFilter::new(&["debug"], false);
        assert!(exclude.apply(&entry("s", "info", "m")));
        assert!(!exclude.apply(&entry("s", "debug", "m")));
        assert!(exclude.apply(&entry("s", "", "m")));
    }

    #[test]
    fn regex_filter_on_message() {
        let f = RegexFilter::new(r"timeout|refused", true).unwrap();
        assert!(f.apply(&entry("s", "info", "connection refused")));
        assert!(!f.apply(&entry("s", "info", "all good")));

        assert!(RegexFilter::new("([bad", true).is_err());
    }

    #[test]
    fn source_filter_exact_match() {
        let f = SourceFilter::new(&["auth"], true);
        assert!(f.apply(&entry("auth", "info", "m")));
        assert!(!f.apply(&entry("auth2", "info", "m")));
    }

    #[test]
    fn field_filter_substring_and_exact() {
        let e = entry("s", "info", "m").add_field("host", "web-1");
        assert!(FieldFilter::new("host", "web", false).apply(&e));
        assert!(!FieldFilter::new("host", "web", true).apply(&e));
        assert!(FieldFilter::new("host", "web-1", true).apply(&e));
        assert!(!FieldFilter::new("absent", "x", false).apply(&e));
    }

    #[test]
    fn composite_filters() {
        let warn_auth = AllFilter::new(vec![
            Arc::new(LevelFilter::new(&["warn"], true)),
            Arc::new(SourceFilter::new(&["auth"], true)),
        ]);
        assert!(warn_auth.apply(&entry("auth", "warn", "m")));
        assert!(!warn_auth.apply(&entry("auth", "info", "m")));

        let warn_or_error = AnyFilter::new(vec![
            Arc::new(LevelFilter::new(&["warn"], true)),
            Arc::new(LevelFilter::new(&["error"], true)),
        ]);
        assert!(warn_or_error.apply(&entry("s", "error", "m")));
        assert!(!warn_or_error.apply(&entry("s", "info", "m")));

        let not_debug = NotFilter::new(Arc::new(LevelFilter::new(&["debug"], true)));
        assert!(not_debug.apply(&entry("s", "info", "m")));
        assert!(!not_debug.apply(&entry("s", "debug", "m")));
    }
}
