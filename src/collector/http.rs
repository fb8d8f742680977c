use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::Collector;
use crate::domain::LogEntry;
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Polls an HTTP endpoint for log records.
///
/// JSON responses are decoded as an array of entries, then a single entry,
/// then kept as one raw entry; anything else is split on newlines. Transient
/// failures are logged and the loop continues.
pub struct HttpCollector {
    name: String,
    source: String,
    url: String,
    poll_interval: Duration,
    client: reqwest::Client,
    pipeline: Arc<Pipeline>,
}

impl HttpCollector {
    pub fn new(url: &str, pipeline: Arc<Pipeline>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Fatal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            name: format!("http-{url}"),
            source: url.to_owned(),
            url: url.to_owned(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            client,
            pipeline,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn fetch(&self) -> Result<()> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::Transient(format!("request to {} failed: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transient(format!(
                "{} returned status {status}",
                self.url
            )));
        }

        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("application/json"));

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Transient(format!("failed to read body from {}: {e}", self.url)))?;

        let entries = if is_json {
            self.decode_json(&body)
        } else {
            self.decode_text(&body)
        };

        if entries.is_empty() {
            return Ok(());
        }
        debug!(count = entries.len(), url = %self.url, "collected entries");
        self.pipeline.process(entries)
    }

    fn decode_json(&self, body: &[u8]) -> Vec<LogEntry> {
        if let Ok(mut entries) = serde_json::from_slice::<Vec<LogEntry>>(body) {
            if !entries.is_empty() {
                for entry in &mut entries {
                    self.fill_defaults(entry);
                }
                return entries;
            }
        }

        if let Ok(mut entry) = serde_json::from_slice::<LogEntry>(body) {
            self.fill_defaults(&mut entry);
            return vec![entry];
        }

        // Unparseable JSON is kept as a single raw entry for the pipeline.
        let text = String::from_utf8_lossy(body).into_owned();
        let mut entry = LogEntry::new(self.source.clone(), text.clone());
        entry.raw = text;
        vec![entry]
    }

    fn decode_text(&self, body: &[u8]) -> Vec<LogEntry> {
        String::from_utf8_lossy(body)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let mut entry = LogEntry::new(self.source.clone(), line.to_owned());
                entry.raw = line.to_owned();
                entry
            })
            .collect()
    }

    fn fill_defaults(&self, entry: &mut LogEntry) {
        if entry.source.is_empty() {
            entry.source = self.source.clone();
        }
        // Missing timestamps already defaulted to now during deserialization.
    }
}

#[async_trait]
impl Collector for HttpCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> &str {
        &self.source
    }

    async fn start(&self, cancel: CancellationToken) -> Result<()> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        // The first tick fires immediately; skip it so polls are spaced.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => return Err(Error::Cancelled),
                _ = ticker.tick() => {
                    if let Err(e) = self.fetch().await {
                        match e {
                            Error::Transient(_) => {
                                warn!(url = %self.url, error = %e, "poll failed, will retry");
                            }
                            other => return Err(other),
                        }
                    }
                }
            }
        }
    }
}
