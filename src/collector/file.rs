use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader, SeekFrom};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Collector;
use crate::domain::LogEntry;
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;

const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Collects lines from a file on a fixed poll interval.
///
/// By default the file is replayed from the start; tail mode seeks to the end
/// and only picks up lines appended afterwards.
pub struct FileCollector {
    name: String,
    source: String,
    path: PathBuf,
    batch_size: usize,
    poll_interval: Duration,
    tail: bool,
    pipeline: Arc<Pipeline>,
}

impl FileCollector {
    pub fn new(path: impl AsRef<Path>, pipeline: Arc<Pipeline>) -> Self {
        let path = path.as_ref();
        // The source identity carries the absolute path regardless of how
        // the collector was configured.
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let source = format!("file://{}", path.display());

        Self {
            name,
            source,
            path,
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            tail: false,
            pipeline,
        }
    }

    /// Skip existing content and only collect newly appended lines.
    pub fn with_tail(mut self, tail: bool) -> Self {
        self.tail = tail;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn make_entry(&self, line: String) -> LogEntry {
        let mut entry = LogEntry::new(self.source.clone(), line.clone());
        entry.raw = line;
        entry
    }

    /// Reads all currently available lines, flushing full batches to the
    /// pipeline. Leftover lines are returned through the final flush.
    async fn drain_available(&self, reader: &mut BufReader<File>) -> Result<()> {
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut line = String::new();

        loop {
            line.clear();
            let read = reader.read_line(&mut line).await?;
            if read == 0 {
                break;
            }

            let trimmed = line.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty() {
                continue;
            }

            batch.push(self.make_entry(trimmed.to_owned()));
            if batch.len() >= self.batch_size {
                self.pipeline.process(std::mem::take(&mut batch))?;
            }
        }

        if !batch.is_empty() {
            self.pipeline.process(batch)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Collector for FileCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> &str {
        &self.source
    }

    async fn start(&self, cancel: CancellationToken) -> Result<()> {
        let meta = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| Error::NotFound(format!("cannot access {}: {e}", self.path.display())))?;
        if meta.is_dir() {
            return Err(Error::NotFound(format!(
                "{} is a directory, not a file",
                self.path.display()
            )));
        }

        let file = File::open(&self.path).await?;
        let mut reader = BufReader::new(file);
        if self.tail {
            reader.seek(SeekFrom::End(0)).await?;
        }

        debug!(path = %self.path.display(), tail = self.tail, "watching file");
        let mut ticker = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                () = cancel.cancelled() => return Err(Error::Cancelled),
                _ = ticker.tick() => self.drain_available(&mut reader).await?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use crate::storage::MemoryStorage;
    use crate::worker::WorkerPool;

    fn pipeline() -> Arc<Pipeline> {
        let metrics = Metrics::unregistered();
        let pool = Arc::new(WorkerPool::new(1, metrics.clone()));
        Arc::new(Pipeline::new(Arc::new(MemoryStorage::new()), pool, metrics))
    }

    #[test]
    fn source_is_an_absolute_uri() {
        let collector = FileCollector::new("logs/app.log", pipeline());
        assert!(
            collector.source().starts_with("file:///"),
            "relative paths must be absolutized, got {}",
            collector.source()
        );
        assert!(collector.source().ends_with("logs/app.log"));
        assert_eq!(collector.name(), "app.log");
    }
}
