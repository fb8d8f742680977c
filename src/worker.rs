use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::metrics::Metrics;

/// A unit of work executed by the pool.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed-size pool of cooperative workers consuming jobs from a bounded
/// queue.
///
/// Submission never blocks the caller: when the queue is full the job is
/// dropped and an error counter is incremented, preferring backpressure over
/// head-of-line blocking of the collector loops.
pub struct WorkerPool {
    workers: usize,
    tx: StdMutex<Option<mpsc::Sender<Job>>>,
    rx: StdMutex<Option<mpsc::Receiver<Job>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    metrics: Arc<Metrics>,
}

impl WorkerPool {
    /// Creates a pool with `workers` workers (clamped to at least one) and a
    /// job queue of capacity `workers * 100`.
    pub fn new(workers: usize, metrics: Arc<Metrics>) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::channel(workers * 100);

        Self {
            workers,
            tx: StdMutex::new(Some(tx)),
            rx: StdMutex::new(Some(rx)),
            handles: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            metrics,
        }
    }

    /// Spawns the worker loops. Idempotent after the first call.
    pub async fn start(&self, cancel: CancellationToken) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let rx = self
            .rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(rx) = rx else { return };
        let rx = Arc::new(Mutex::new(rx));

        self.metrics.workers_active.set(self.workers as f64);
        info!(workers = self.workers, "starting worker pool");

        let mut handles = self.handles.lock().await;
        for id in 0..self.workers {
            let rx = rx.clone();
            let cancel = cancel.clone();
            let metrics = self.metrics.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(id, rx, cancel, metrics).await;
            }));
        }
    }

    /// Enqueues a job without blocking. A full queue drops the job and
    /// increments the drop counter; only a stopped pool is an error.
    pub fn submit(&self, job: Job) -> Result<()> {
        let guard = self
            .tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(tx) = guard.as_ref() else {
            return Err(Error::Closed);
        };

        match tx.try_send(job) {
            Ok(()) => {
                self.metrics.work_queue_depth.inc();
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics.jobs_dropped.inc();
                debug!("work queue full, dropping job");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(Error::Closed),
        }
    }

    /// Closes the job queue and waits for the workers to drain, up to
    /// `deadline`. Idempotent.
    pub async fn stop(&self, deadline: Duration) {
        {
            let mut guard = self
                .tx
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if guard.take().is_none() {
                return;
            }
        }

        let handles = std::mem::take(&mut *self.handles.lock().await);
        let drain = async {
            for handle in handles {
                let _ = handle.await;
            }
        };

        if tokio::time::timeout(deadline, drain).await.is_err() {
            error!("worker pool drain exceeded deadline");
        }

        self.metrics.workers_active.set(0.0);
        info!("worker pool stopped");
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

async fn worker_loop(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    cancel: CancellationToken,
    metrics: Arc<Metrics>,
) {
    loop {
        let job = {
            let mut rx = rx.lock().await;
            tokio::select! {
                () = cancel.cancelled() => None,
                job = rx.recv() => job,
            }
        };

        let Some(job) = job else {
            debug!(worker = id, "worker exiting");
            return;
        };

        metrics.work_queue_depth.dec();
        let start = Instant::now();

        // Jobs run inside a recovery scope so a panicking entry cannot take
        // the worker down with it.
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            metrics.jobs_panicked.inc();
            error!(worker = id, "job panicked");
        }

        metrics.jobs_processed.inc();
        metrics.worker_time.observe(start.elapsed().as_secs_f64());
    }
}
