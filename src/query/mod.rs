use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::domain::query::{
    ANALYSIS_CORRELATION, ANALYSIS_COUNT, ANALYSIS_FREQUENCY, ANALYSIS_PATTERNS,
    ANALYSIS_TIME_SERIES,
};
use crate::domain::{Analysis, AnalysisResult, LogEntry, Pattern, PatternConfig, Query};
use crate::error::{Error, Result};
use crate::storage::Storage;

const MAX_PATTERNS: usize = 10;
const MAX_PATTERN_EXAMPLES: usize = 3;

/// Answers filter queries and aggregate analyses against storage.
pub struct QueryEngine {
    storage: Arc<dyn Storage>,
}

impl QueryEngine {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Forwards the query to storage.
    pub fn execute(&self, query: &Query) -> Result<Vec<LogEntry>> {
        self.storage.query(query, &CancellationToken::new())
    }

    /// Parses a whitespace-tokenized query string.
    ///
    /// Recognized forms: `from <time>` / `to <time>` (accepted, currently
    /// ignored), `source <csv>` / `source: <csv>`, `level <csv>` /
    /// `level: <csv>`, `limit <int>`, `<field>:<value>` pairs, and bare
    /// tokens concatenated into the free-text filter.
    pub fn parse_query(&self, input: &str) -> Query {
        let mut query = Query::default();
        let tokens: Vec<&str> = input.split_whitespace().collect();

        let mut i = 0;
        while i < tokens.len() {
            let token = tokens[i];

            match token.to_lowercase().as_str() {
                "from" | "to" => {
                    // Time parsing deferred; consume the operand.
                    if i + 1 < tokens.len() {
                        i += 1;
                    }
                }
                "source" | "source:" => {
                    if i + 1 < tokens.len() {
                        i += 1;
                        query
                            .sources
                            .extend(tokens[i].split(',').map(str::to_owned));
                    }
                }
                "level" | "level:" => {
                    if i + 1 < tokens.len() {
                        i += 1;
                        query
                            .levels
                            .extend(tokens[i].split(',').map(str::to_owned));
                    }
                }
                "limit" | "limit:" => {
                    if i + 1 < tokens.len() {
                        i += 1;
                        if let Ok(limit) = tokens[i].parse::<usize>() {
                            query.limit = limit;
                        }
                    }
                }
                _ => {
                    if let Some((field, value)) = token.split_once(':') {
                        query
                            .filter_fields
                            .insert(field.to_owned(), value.to_owned());
                    } else {
                        if !query.filter.is_empty() {
                            query.filter.push(' ');
                        }
                        query.filter.push_str(token);
                    }
                }
            }

            i += 1;
        }

        query
    }

    /// Runs an analysis: fetches the matching corpus (unlimited), then
    /// dispatches on the analysis type.
    pub fn analyze(&self, analysis: &Analysis) -> Result<AnalysisResult> {
        let query = Query {
            time_range: analysis.time_range.clone(),
            sources: analysis.sources.clone(),
            levels: analysis.levels.clone(),
            filter: analysis.filter.clone(),
            limit: 0,
            ..Query::default()
        };

        let entries = self.storage.query(&query, &CancellationToken::new())?;

        let mut result = AnalysisResult {
            analysis_type: analysis.analysis_type.clone(),
            time_range: analysis.time_range.clone(),
            ..AnalysisResult::default()
        };

        match analysis.analysis_type.as_str() {
            ANALYSIS_COUNT => {
                result.count = Some(entries.len() as u64);
            }
            ANALYSIS_FREQUENCY => {
                if analysis.group_by.is_empty() {
                    return Err(Error::InvalidArgument(
                        "frequency analysis requires a group_by field".to_owned(),
                    ));
                }
                result.frequency = Some(frequency(&entries, &analysis.group_by));
            }
            ANALYSIS_TIME_SERIES => {
                result.time_series = Some(time_series(&entries, &analysis.interval));
            }
            ANALYSIS_PATTERNS => {
                result.patterns = Some(patterns(&entries, &analysis.pattern_config));
            }
            ANALYSIS_CORRELATION => {
                if analysis.correlation_fields.len() < 2 {
                    return Err(Error::InvalidArgument(
                        "correlation analysis requires at least two fields".to_owned(),
                    ));
                }
                result.correlation = Some(correlation(&entries, &analysis.correlation_fields));
            }
            other => return Err(Error::Unsupported(other.to_owned())),
        }

        Ok(result)
    }
}

/// Resolves a grouping key against an entry: `source` and `level` read the
/// attributes, anything else is a field lookup, defaulting to `unknown`.
fn resolve_value(entry: &LogEntry, key: &str) -> String {
    match key.to_lowercase().as_str() {
        "source" => entry.source.clone(),
        "level" => entry.level.clone(),
        _ => entry
            .get_string_field(key)
            .unwrap_or_else(|| "unknown".to_owned()),
    }
}

fn frequency(entries: &[LogEntry], group_by: &str) -> HashMap<String, u64> {
    let mut tally: HashMap<String, u64> = HashMap::new();
    for entry in entries {
        *tally.entry(resolve_value(entry, group_by)).or_default() += 1;
    }
    tally
}

fn time_series(entries: &[LogEntry], interval: &str) -> HashMap<String, u64> {
    let format = match interval.to_lowercase().as_str() {
        "minute" => "%Y-%m-%d %H:%M",
        "hour" => "%Y-%m-%d %H",
        "month" => "%Y-%m",
        // Unrecognized intervals bucket by day.
        _ => "%Y-%m-%d",
    };

    let mut buckets: HashMap<String, u64> = HashMap::new();
    for entry in entries {
        let key = entry.timestamp.format(format).to_string();
        *buckets.entry(key).or_default() += 1;
    }
    buckets
}

fn patterns(entries: &[LogEntry], config: &PatternConfig) -> Vec<Pattern> {
    // These cannot fail at runtime; the expressions are fixed.
    let number_re = Regex::new(r"\b\d+\b").expect("number pattern");
    let ip_re = Regex::new(r"\b\d{1,3}(?:\.\d{1,3}){3}\b").expect("ip pattern");
    let uuid_re = Regex::new(
        r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b",
    )
    .expect("uuid pattern");

    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut examples: HashMap<String, Vec<String>> = HashMap::new();

    for entry in entries {
        if entry.message.is_empty() {
            continue;
        }

        let mut template = entry.message.clone();
        if config.replace_uuids {
            template = uuid_re.replace_all(&template, "{uuid}").into_owned();
        }
        if config.replace_ips {
            template = ip_re.replace_all(&template, "{ip}").into_owned();
        }
        if config.replace_numbers {
            template = number_re.replace_all(&template, "{number}").into_owned();
        }

        *counts.entry(template.clone()).or_default() += 1;
        let samples = examples.entry(template).or_default();
        if samples.len() < MAX_PATTERN_EXAMPLES {
            samples.push(entry.message.clone());
        }
    }

    let mut patterns: Vec<Pattern> = counts
        .into_iter()
        .filter(|(_, count)| config.min_count == 0 || *count >= config.min_count)
        .map(|(pattern, count)| Pattern {
            examples: examples.remove(&pattern).unwrap_or_default(),
            pattern,
            count,
        })
        .collect();

    // Most frequent first; ties broken by template for stable output.
    patterns.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.pattern.cmp(&b.pattern)));
    patterns.truncate(MAX_PATTERNS);
    patterns
}

fn correlation(
    entries: &[LogEntry],
    fields: &[String],
) -> HashMap<String, HashMap<String, u64>> {
    let mut correlation: HashMap<String, HashMap<String, u64>> = HashMap::new();
    for field in fields {
        correlation.entry(field.clone()).or_default();
    }

    // Counts are recorded under both orders of each distinct pair.
    for entry in entries {
        for field1 in fields {
            for field2 in fields {
                if field1 == field2 {
                    continue;
                }
                let value2 = resolve_value(entry, field2);
                let key = format!("{field2}={value2}");
                *correlation
                    .entry(field1.clone())
                    .or_default()
                    .entry(key)
                    .or_default() += 1;
            }
        }
    }

    correlation
}
