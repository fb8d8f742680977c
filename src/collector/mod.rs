pub mod file;
pub mod http;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use url::Url;

use crate::error::{Error, Result};
use crate::pipeline::Pipeline;

pub use file::FileCollector;
pub use http::HttpCollector;

/// A long-lived task that pulls raw records from one source and feeds the
/// pipeline.
#[async_trait]
pub trait Collector: Send + Sync {
    fn name(&self) -> &str;

    /// The source identifier stamped onto collected entries.
    fn source(&self) -> &str;

    /// Runs until cancellation (returning `Error::Cancelled`) or an
    /// unrecoverable failure.
    async fn start(&self, cancel: CancellationToken) -> Result<()>;
}

/// Builds a collector from a source URI, dispatching on scheme.
pub fn from_uri(uri: &str, pipeline: Arc<Pipeline>) -> Result<Box<dyn Collector>> {
    let parsed =
        Url::parse(uri).map_err(|e| Error::InvalidArgument(format!("invalid source URI {uri}: {e}")))?;

    match parsed.scheme() {
        "file" => Ok(Box::new(FileCollector::new(parsed.path(), pipeline))),
        "http" | "https" => Ok(Box::new(HttpCollector::new(uri, pipeline)?)),
        other => Err(Error::UnsupportedScheme(other.to_owned())),
    }
}

/// Runs collectors in parallel until all return.
///
/// The first non-cancellation error cancels the peers and becomes the
/// supervisor's result.
pub async fn run_all(
    collectors: Vec<Box<dyn Collector>>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut set = JoinSet::new();

    for collector in collectors {
        let cancel = cancel.clone();
        info!(
            collector = collector.name(),
            source = collector.source(),
            "starting collector"
        );
        set.spawn(async move { collector.start(cancel).await });
    }

    let mut first_error = None;
    while let Some(joined) = set.join_next().await {
        let result = match joined {
            Ok(result) => result,
            Err(e) => Err(Error::Fatal(format!("collector task failed: {e}"))),
        };

        if let Err(e) = result {
            if !e.is_cancellation() && first_error.is_none() {
                error!(error = %e, "collector failed, shutting down peers");
                cancel.cancel();
                first_error = Some(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
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
    fn factory_dispatches_on_scheme() {
        let p = pipeline();
        assert!(from_uri("file:///var/log/app.log", p.clone()).is_ok());
        assert!(from_uri("http://example.com/logs", p.clone()).is_ok());
        assert!(from_uri("https://example.com/logs", p.clone()).is_ok());
    }

    #[test]
    fn factory_rejects_unknown_scheme() {
        let err = match from_uri("ftp://example.com/logs", pipeline()) {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        assert!(matches!(err, Error::UnsupportedScheme(s) if s == "ftp"));
    }

    #[test]
    fn factory_rejects_malformed_uri() {
        let err = match from_uri("not a uri", pipeline()) {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
