use serde_json::{Map, Value};

use super::{Parser, parse_timestamp, timestamp_from_number};
use crate::domain::LogEntry;
use crate::error::Result;

/// Parser for JSON-formatted log lines.
///
/// Well-known keys are mapped case-insensitively onto the entry attributes;
/// everything else flows into `fields`.
pub struct JsonParser;

impl JsonParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for JsonParser {
    fn name(&self) -> &str {
        "json"
    }

    fn can_parse(&self, raw: &str) -> bool {
        raw.trim_start().starts_with('{')
    }

    fn parse(&self, entry: &mut LogEntry) -> Result<()> {
        let data: Map<String, Value> = serde_json::from_str(&entry.raw)?;

        for (key, value) in &data {
            match key.to_lowercase().as_str() {
                "timestamp" | "time" | "@timestamp" | "date" => {
                    apply_timestamp(entry, value);
                }
                "message" | "msg" | "@message" => {
                    if let Value::String(s) = value {
                        entry.message = s.clone();
                    }
                }
                "level" | "severity" | "loglevel" | "@level" => {
                    if let Value::String(s) = value {
                        entry.level = s.to_lowercase();
                    }
                }
                "source" | "logger" | "origin" | "@module" => {
                    if let Value::String(s) = value {
                        entry.source = s.clone();
                    }
                }
                _ => {
                    entry.fields.insert(key.clone(), value.clone());
                }
            }
        }

        // No recognizable message key: keep the whole object as the message.
        if entry.message.is_empty() {
            entry.message = serde_json::to_string(&data)?;
        }

        Ok(())
    }
}

fn apply_timestamp(entry: &mut LogEntry, value: &Value) {
    match value {
        Value::String(s) => {
            if let Some(ts) = parse_timestamp(s) {
                entry.timestamp = ts;
            }
        }
        Value::Number(n) => {
            if let Some(ts) = n.as_f64().and_then(timestamp_from_number) {
                entry.timestamp = ts;
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn parse_raw(raw: &str) -> LogEntry {
        let mut entry = LogEntry::new("test", "");
        entry.raw = raw.to_owned();
        JsonParser::new().parse(&mut entry).unwrap();
        entry
    }

    #[test]
    fn sniffs_leading_brace() {
        let parser = JsonParser::new();
        assert!(parser.can_parse(r#"{"msg":"x"}"#));
        assert!(parser.can_parse(r#"   {"msg":"x"}"#));
        assert!(!parser.can_parse("plain text"));
        assert!(!parser.can_parse(""));
    }

    #[test]
    fn maps_known_keys_case_insensitively() {
        let entry = parse_raw(
            r#"{"Timestamp":"2025-05-13T00:01:00Z","MESSAGE":"hello","Level":"WARN","Logger":"auth","host":"h1"}"#,
        );
        assert_eq!(
            entry.timestamp,
            Utc.with_ymd_and_hms(2025, 5, 13, 0, 1, 0).unwrap()
        );
        assert_eq!(entry.message, "hello");
        assert_eq!(entry.level, "warn");
        assert_eq!(entry.source, "auth");
        assert_eq!(entry.get_string_field("host").as_deref(), Some("h1"));
    }

    #[test]
    fn numeric_timestamps_choose_unit_by_magnitude() {
        let entry = parse_raw(r#"{"time":1747094460,"msg":"s"}"#);
        assert_eq!(entry.timestamp.timestamp(), 1_747_094_460);

        let entry = parse_raw(r#"{"time":1747094460500,"msg":"ms"}"#);
        assert_eq!(entry.timestamp.timestamp_millis(), 1_747_094_460_500);
    }

    #[test]
    fn missing_message_reserializes_object() {
        let entry = parse_raw(r#"{"level":"info","code":7}"#);
        assert!(entry.message.contains("\"code\":7"));
        assert_eq!(entry.level, "info");
    }

    #[test]
    fn unknown_keys_preserve_value_types() {
        let entry = parse_raw(r#"{"msg":"m","count":3,"ok":true,"missing":null}"#);
        assert_eq!(entry.get_field("count"), Some(&serde_json::json!(3)));
        assert_eq!(entry.get_field("ok"), Some(&serde_json::json!(true)));
        assert_eq!(entry.get_field("missing"), Some(&serde_json::Value::Null));
    }

    #[test]
    fn invalid_json_is_an_error() {
        let mut entry = LogEntry::new("test", "");
        entry.raw = "{not json".to_owned();
        assert!(JsonParser::new().parse(&mut entry).is_err());
    }
}
