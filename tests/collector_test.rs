use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use havn::collector::{self, Collector, FileCollector};
use havn::domain::Query;
use havn::error::{Error, Result};
use havn::metrics::Metrics;
use havn::pipeline::Pipeline;
use havn::storage::{MemoryStorage, Storage};
use havn::worker::WorkerPool;

struct Harness {
    storage: Arc<MemoryStorage>,
    pool: Arc<WorkerPool>,
    pipeline: Arc<Pipeline>,
}

async fn harness() -> Harness {
    let metrics = Metrics::unregistered();
    let storage = Arc::new(MemoryStorage::new());
    let pool = Arc::new(WorkerPool::new(2, metrics.clone()));
    pool.start(CancellationToken::new()).await;
    let pipeline = Arc::new(Pipeline::new(storage.clone(), pool.clone(), metrics));
    Harness {
        storage,
        pool,
        pipeline,
    }
}

#[tokio::test]
async fn file_collector_emits_lines_within_two_seconds() {
    let h = harness().await;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    let lines = ["alpha line", "beta line", "gamma line"];
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file.flush().unwrap();

    let collector = FileCollector::new(file.path(), h.pipeline.clone())
        .with_poll_interval(Duration::from_millis(100));
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let handle = tokio::spawn(async move { collector.start(token).await });

    // All three lines should arrive well within two seconds.
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if h.storage.len() >= lines.len() {
            break;
        }
        assert!(Instant::now() < deadline, "collector produced no entries in time");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    cancel.cancel();
    let result = handle.await.unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));
    h.pool.stop(Duration::from_secs(5)).await;

    let out = h
        .storage
        .query(&Query::default(), &CancellationToken::new())
        .unwrap();
    for entry in &out {
        assert!(
            lines.contains(&entry.message.as_str()),
            "unexpected message {:?}",
            entry.message
        );
        assert!(entry.source.starts_with("file://"));
    }
}

#[tokio::test]
async fn file_collector_cancellation_is_prompt() {
    let h = harness().await;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "one line").unwrap();
    file.flush().unwrap();

    let collector = FileCollector::new(file.path(), h.pipeline.clone())
        .with_poll_interval(Duration::from_millis(200));
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let handle = tokio::spawn(async move { collector.start(token).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    let started = Instant::now();
    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_millis(500), handle)
        .await
        .expect("collector did not stop within one poll interval")
        .unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn file_collector_missing_file_is_not_found() {
    let h = harness().await;
    let collector = FileCollector::new("/definitely/not/here.log", h.pipeline.clone());
    let result = collector.start(CancellationToken::new()).await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn file_collector_rejects_directories() {
    let h = harness().await;
    let dir = tempfile::tempdir().unwrap();
    let collector = FileCollector::new(dir.path(), h.pipeline.clone());
    let result = collector.start(CancellationToken::new()).await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

struct StubCollector {
    name: String,
    outcome: Option<Error>,
}

#[async_trait::async_trait]
impl Collector for StubCollector {
    fn name(&self) -> &str {
        &self.name
    }
    fn source(&self) -> &str {
        "stub://"
    }
    async fn start(&self, cancel: CancellationToken) -> Result<()> {
        match &self.outcome {
            Some(Error::Fatal(msg)) => Err(Error::Fatal(msg.clone())),
            Some(_) => Err(Error::Cancelled),
            None => {
                cancel.cancelled().await;
                Err(Error::Cancelled)
            }
        }
    }
}

#[tokio::test]
async fn supervisor_propagates_first_real_error_and_cancels_peers() {
    let collectors: Vec<Box<dyn Collector>> = vec![
        Box::new(StubCollector {
            name: "healthy".into(),
            outcome: None,
        }),
        Box::new(StubCollector {
            name: "broken".into(),
            outcome: Some(Error::Fatal("disk on fire".into())),
        }),
    ];

    let cancel = CancellationToken::new();
    let result = tokio::time::timeout(
        Duration::from_secs(2),
        collector::run_all(collectors, cancel),
    )
    .await
    .expect("supervisor must return once a collector fails");

    match result {
        Err(Error::Fatal(msg)) => assert!(msg.contains("disk on fire")),
        other => panic!("expected fatal error, got {other:?}"),
    }
}

#[tokio::test]
async fn supervisor_treats_cancellation_as_clean_exit() {
    let collectors: Vec<Box<dyn Collector>> = vec![Box::new(StubCollector {
        name: "idle".into(),
        outcome: None,
    })];

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = collector::run_all(collectors, cancel).await;
    assert!(result.is_ok());
}
