pub mod disk;
pub mod memory;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::domain::{LogEntry, Query};
use crate::error::{Error, Result};

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

/// Contract shared by the storage backends.
pub trait Storage: Send + Sync {
    /// Appends an entry. On success the entry is durable under the backend's
    /// semantics.
    fn store(&self, entry: LogEntry) -> Result<()>;

    /// Returns entries matching the query, sorted and truncated per the
    /// query's sort and limit. The scan checks `cancel` between entries.
    fn query(&self, query: &Query, cancel: &CancellationToken) -> Result<Vec<LogEntry>>;

    /// Distinct sources observed.
    fn sources(&self) -> Result<Vec<String>>;

    fn stats(&self) -> Result<StorageStats>;

    /// Flushes buffers. Further calls on the backend fail with `Closed`.
    fn close(&self) -> Result<()>;
}

/// Statistics about the stored corpus.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageStats {
    pub total_entries: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oldest_entry: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newest_entry: Option<DateTime<Utc>>,
    pub entries_by_source: HashMap<String, u64>,
    pub entries_by_level: HashMap<String, u64>,
    /// Approximate size in bytes.
    pub storage_size: u64,
    pub compression_ratio: f64,
}

/// Opens a storage backend by kind: `memory` or `disk`.
pub fn open(kind: &str, path: &Path) -> Result<Arc<dyn Storage>> {
    match kind.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(MemoryStorage::new())),
        "disk" => Ok(Arc::new(DiskStorage::new(path)?)),
        other => Err(Error::InvalidArgument(format!(
            "unknown storage kind: {other}"
        ))),
    }
}

/// Applies the full query predicate chain to one entry: time range, source
/// set, level set, free-text filter, and per-field filters.
pub(crate) fn matches(entry: &LogEntry, query: &Query) -> bool {
    if !query.time_range.contains(entry.timestamp) {
        return false;
    }

    if !query.sources.is_empty() && !query.sources.iter().any(|s| *s == entry.source) {
        return false;
    }

    if !query.levels.is_empty()
        && !query
            .levels
            .iter()
            .any(|l| l.eq_ignore_ascii_case(&entry.level))
    {
        return false;
    }

    if !query.filter.is_empty() && !matches_text_filter(entry, &query.filter) {
        return false;
    }

    for (field, needle) in &query.filter_fields {
        let Some(value) = entry.fields.get(field) else {
            return false;
        };
        if !stringify(value).contains(needle.as_str()) {
            return false;
        }
    }

    true
}

/// Case-insensitive substring match against message, source, level, field
/// keys, and string-valued fields.
fn matches_text_filter(entry: &LogEntry, filter: &str) -> bool {
    let needle = filter.to_lowercase();

    if entry.message.to_lowercase().contains(&needle)
        || entry.source.to_lowercase().contains(&needle)
        || entry.level.to_lowercase().contains(&needle)
    {
        return true;
    }

    entry.fields.iter().any(|(key, value)| {
        if key.to_lowercase().contains(&needle) {
            return true;
        }
        match value {
            Value::String(s) => s.to_lowercase().contains(&needle),
            _ => false,
        }
    })
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Sorts by the query's sort key and order, then truncates to its limit.
pub(crate) fn sort_and_truncate(mut entries: Vec<LogEntry>, query: &Query) -> Vec<LogEntry> {
    let compare: fn(&LogEntry, &LogEntry) -> Ordering = match query.sort_by.as_str() {
        "source" => |a, b| a.source.cmp(&b.source),
        "level" => |a, b| a.level.cmp(&b.level),
        "message" => |a, b| a.message.cmp(&b.message),
        // Unknown keys fall back to timestamp ordering.
        _ => |a, b| a.timestamp.cmp(&b.timestamp),
    };

    entries.sort_by(compare);
    if query.sort_order != "asc" {
        entries.reverse();
    }

    if query.limit > 0 && entries.len() > query.limit {
        entries.truncate(query.limit);
    }
    entries
}

/// Scans a slice with per-entry cancellation checks, collecting matches.
pub(crate) fn scan<'a, I>(
    entries: I,
    query: &Query,
    cancel: &CancellationToken,
) -> Result<Vec<LogEntry>>
where
    I: IntoIterator<Item = &'a LogEntry>,
{
    let mut result = Vec::new();
    for entry in entries {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if matches(entry, query) {
            result.push(entry.clone());
        }
    }
    Ok(result)
}
