use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::Value;

use super::Parser;
use crate::domain::LogEntry;
use crate::error::{Error, Result};

/// A named pattern binding capture groups to entry attributes.
pub struct RegexPattern {
    name: String,
    regex: Regex,
    time_formats: Vec<String>,
    time_field: String,
    msg_field: String,
    level_field: String,
    source_field: String,
}

/// Parser driven by a registered list of named regex patterns with named
/// capture groups. The first pattern matching the whole line wins.
pub struct RegexParser {
    patterns: Vec<RegexPattern>,
}

impl RegexParser {
    pub fn new() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Creates a parser preloaded with the common log formats: Apache/Nginx
    /// access lines, `timestamp LEVEL source: message`, Kubernetes RFC3339
    /// lines, and the bracketed `[ts] [level] message` form.
    pub fn with_default_patterns() -> Self {
        let mut parser = Self::new();

        parser
            .add_pattern(
                "apache",
                r#"^(?P<ip>\S+) \S+ \S+ \[(?P<timestamp>[^\]]+)\] "(?P<method>\S+) (?P<path>\S+) (?P<protocol>\S+)" (?P<status>\d+) (?P<bytes>\d+)"#,
                &["%d/%b/%Y:%H:%M:%S %z"],
                "timestamp",
                "",
                "",
                "",
            )
            .expect("built-in apache pattern");

        parser
            .add_pattern(
                "common",
                r"^(?P<timestamp>\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(?:\.\d+)?) (?P<level>[A-Z]+) (?P<source>[^:]+): (?P<message>.+)$",
                &["%Y-%m-%d %H:%M:%S%.f"],
                "timestamp",
                "message",
                "level",
                "source",
            )
            .expect("built-in common pattern");

        parser
            .add_pattern(
                "kubernetes",
                r"^(?P<timestamp>\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?Z) (?P<level>[A-Z]+) +(?P<source>\S+) +(?P<message>.+)$",
                &["rfc3339"],
                "timestamp",
                "message",
                "level",
                "source",
            )
            .expect("built-in kubernetes pattern");

        parser
            .add_pattern(
                "brackets",
                r"^\[(?P<timestamp>[^\]]+)\] \[(?P<level>[^\]]+)\] (?P<message>.+)$",
                &["rfc3339", "%Y-%m-%d %H:%M:%S"],
                "timestamp",
                "message",
                "level",
                "",
            )
            .expect("built-in brackets pattern");

        parser
    }

    /// Registers a pattern. `time_formats` entries are chrono format strings,
    /// or the literal `rfc3339`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_pattern(
        &mut self,
        name: &str,
        pattern: &str,
        time_formats: &[&str],
        time_field: &str,
        msg_field: &str,
        level_field: &str,
        source_field: &str,
    ) -> Result<()> {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::InvalidArgument(format!("invalid regex pattern: {e}")))?;

        self.patterns.push(RegexPattern {
            name: name.to_owned(),
            regex,
            time_formats: time_formats.iter().map(|f| (*f).to_owned()).collect(),
            time_field: time_field.to_owned(),
            msg_field: msg_field.to_owned(),
            level_field: level_field.to_owned(),
            source_field: source_field.to_owned(),
        });

        Ok(())
    }

    pub fn pattern_names(&self) -> Vec<&str> {
        self.patterns.iter().map(|p| p.name.as_str()).collect()
    }
}

impl Default for RegexParser {
    fn default() -> Self {
        Self::with_default_patterns()
    }
}

impl Parser for RegexParser {
    fn name(&self) -> &str {
        "regex"
    }

    fn can_parse(&self, raw: &str) -> bool {
        self.patterns.iter().any(|p| p.regex.is_match(raw))
    }

    fn parse(&self, entry: &mut LogEntry) -> Result<()> {
        for pattern in &self.patterns {
            let Some(captures) = pattern.regex.captures(&entry.raw) else {
                continue;
            };

            let mut timestamp = None;
            let mut message = None;
            let mut level = None;
            let mut source = None;
            let mut extra: Vec<(String, String)> = Vec::new();

            for name in pattern.regex.capture_names().flatten() {
                let Some(value) = captures.name(name) else {
                    continue;
                };
                let value = value.as_str();

                if name == pattern.time_field && !pattern.time_field.is_empty() {
                    timestamp = parse_with_formats(value, &pattern.time_formats);
                } else if name == pattern.msg_field && !pattern.msg_field.is_empty() {
                    message = Some(value.to_owned());
                } else if name == pattern.level_field && !pattern.level_field.is_empty() {
                    level = Some(value.to_lowercase());
                } else if name == pattern.source_field && !pattern.source_field.is_empty() {
                    source = Some(value.to_owned());
                } else {
                    extra.push((name.to_owned(), value.to_owned()));
                }
            }

            if let Some(ts) = timestamp {
                entry.timestamp = ts;
            }
            match message {
                Some(msg) => entry.message = msg,
                // No message group defined: keep the whole line.
                None if entry.message.is_empty() => entry.message = entry.raw.clone(),
                None => {}
            }
            if let Some(level) = level {
                entry.level = level;
            }
            if let Some(source) = source {
                entry.source = source;
            }
            for (key, value) in extra {
                entry.fields.insert(key, Value::String(value));
            }
            entry
                .fields
                .insert("pattern".to_owned(), Value::String(pattern.name.clone()));

            return Ok(());
        }

        // No pattern matched; keep the raw line as the message.
        if entry.message.is_empty() {
            entry.message = entry.raw.clone();
        }
        Ok(())
    }
}

fn parse_with_formats(value: &str, formats: &[String]) -> Option<DateTime<Utc>> {
    for format in formats {
        if format == "rfc3339" {
            if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
                return Some(ts.with_timezone(&Utc));
            }
            continue;
        }
        if format.contains("%z") {
            if let Ok(ts) = DateTime::parse_from_str(value, format) {
                return Some(ts.with_timezone(&Utc));
            }
        } else if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    None
}
