pub mod json;
pub mod regex;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::domain::LogEntry;
use crate::error::Result;

pub use json::JsonParser;
pub use regex::{RegexParser, RegexPattern};

/// A format-detecting parser.
///
/// `can_parse` is a cheap sniff over the raw record; `parse` mutates the
/// entry's timestamp, level, source, message, and fields from `entry.raw`.
pub trait Parser: Send + Sync {
    fn name(&self) -> &str;

    fn can_parse(&self, raw: &str) -> bool;

    fn parse(&self, entry: &mut LogEntry) -> Result<()>;
}

/// The default parser set, tried in order by the pipeline.
pub fn default_parsers() -> Vec<Box<dyn Parser>> {
    vec![
        Box::new(JsonParser::new()),
        Box::new(RegexParser::with_default_patterns()),
    ]
}

/// Parses a timestamp string through the accepted format ladder.
///
/// Tried in order: RFC3339 (with or without fractional seconds), ISO-ish
/// local formats, then Unix and Ruby date styles. Naive formats are taken as
/// UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y/%m/%d %H:%M:%S",
        // Unix date with its fixed UTC zone column
        "%a %b %e %H:%M:%S UTC %Y",
    ];
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    // Ruby date carries a numeric offset
    if let Ok(ts) = DateTime::parse_from_str(value, "%a %b %d %H:%M:%S %z %Y") {
        return Some(ts.with_timezone(&Utc));
    }

    None
}

/// Coerces a numeric timestamp: values above 1e12 are treated as
/// milliseconds since the epoch, everything else as seconds.
pub fn timestamp_from_number(value: f64) -> Option<DateTime<Utc>> {
    if value > 1e12 {
        DateTime::from_timestamp_millis(value as i64)
    } else {
        let secs = value as i64;
        let nanos = ((value - secs as f64) * 1e9) as u32;
        DateTime::from_timestamp(secs, nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_rfc3339_variants() {
        assert_eq!(
            parse_timestamp("2025-05-13T00:01:00Z"),
            Some(Utc.with_ymd_and_hms(2025, 5, 13, 0, 1, 0).unwrap())
        );
        let nano = parse_timestamp("2025-05-13T00:01:00.123456789Z").unwrap();
        assert_eq!(nano.timestamp_subsec_nanos(), 123_456_789);
    }

    #[test]
    fn parses_naive_formats_as_utc() {
        assert_eq!(
            parse_timestamp("2025-05-13 00:01:00"),
            Some(Utc.with_ymd_and_hms(2025, 5, 13, 0, 1, 0).unwrap())
        );
        assert_eq!(
            parse_timestamp("2025/05/13 00:01:00"),
            Some(Utc.with_ymd_and_hms(2025, 5, 13, 0, 1, 0).unwrap())
        );
    }

    #[test]
    fn parses_ruby_date_offsets() {
        let ts = parse_timestamp("Tue May 13 02:01:00 +0200 2025").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2025, 5, 13, 0, 1, 0).unwrap());
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_timestamp("not a time"), None);
    }

    #[test]
    fn numeric_seconds_and_milliseconds() {
        let secs = timestamp_from_number(1_747_094_460.0).unwrap();
        assert_eq!(secs.timestamp(), 1_747_094_460);

        let millis = timestamp_from_number(1_747_094_460_500.0).unwrap();
        assert_eq!(millis.timestamp_millis(), 1_747_094_460_500);
    }
}
