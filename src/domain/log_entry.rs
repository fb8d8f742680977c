use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single log record with associated metadata.
///
/// This is the canonical representation of a log entry throughout the
/// pipeline, from collector output through storage and query results.
/// Identity is the tuple (timestamp, source, message, fields); there is no
/// assigned global id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Time the entry was created, defaulting to ingestion time when the
    /// wire representation carries none.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Where the log came from, typically a collector URI or a
    /// parser-extracted origin.
    #[serde(default)]
    pub source: String,

    /// Severity level, lowercased (`debug`, `info`, `warn`, `error`, or
    /// `unknown` when parsing cannot determine one).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub level: String,

    /// The main log message. Never empty once the pipeline has run; parsing
    /// failures fall back to the raw line.
    #[serde(default)]
    pub message: String,

    /// Additional structured data extracted from the record.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub fields: HashMap<String, Value>,

    /// The original unparsed record. Present during ingestion, omitted from
    /// externalized JSON.
    #[serde(skip)]
    pub raw: String,
}

impl LogEntry {
    /// Creates a new entry stamped with the current time.
    pub fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            source: source.into(),
            level: String::new(),
            message: message.into(),
            fields: HashMap::new(),
            raw: String::new(),
        }
    }

    /// Builder-style field insertion.
    pub fn add_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn set_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn get_field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Returns the field as a string, stringifying non-string values.
    pub fn get_string_field(&self, key: &str) -> Option<String> {
        self.fields.get(key).map(field_to_string)
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Renders a field value without the surrounding quotes JSON would add.
pub fn field_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.source,
            self.message,
        )
    }
}
