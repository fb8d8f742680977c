use std::sync::Arc;
use std::time::Duration;

use prometheus::Registry;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::pipeline::Pipeline;
use crate::plugin;
use crate::query::QueryEngine;
use crate::storage::{self, Storage};
use crate::worker::WorkerPool;

/// Shared application state behind the HTTP handlers and the collectors.
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub engine: QueryEngine,
    pub pipeline: Arc<Pipeline>,
    pub pool: Arc<WorkerPool>,
    pub plugins: Arc<plugin::Registry>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Wires storage, worker pool, pipeline, plugins, and the query engine
    /// from configuration. The pool's workers start under `cancel`.
    pub async fn from_settings(settings: &Settings, cancel: CancellationToken) -> Result<Self> {
        let metrics = Arc::new(
            Metrics::new(Arc::new(Registry::new()))
                .map_err(|e| Error::Fatal(format!("failed to register metrics: {e}")))?,
        );

        let storage = storage::open(&settings.api.storage, &settings.api.storage_path)?;
        let pool = Arc::new(WorkerPool::new(settings.collect.workers, metrics.clone()));
        pool.start(cancel.child_token()).await;

        let pipeline = Arc::new(Pipeline::new(storage.clone(), pool.clone(), metrics.clone()));

        let plugins = Arc::new(plugin::Registry::new());
        for name in &settings.plugins.enabled {
            let Some(instance) = plugin::builtin(name) else {
                return Err(Error::NotFound(format!("plugin {name} not found")));
            };
            plugins.register(instance.clone())?;
            plugins.configure(name, &settings.plugins.config)?;
            pipeline.add_plugin(instance);
        }

        Ok(Self {
            engine: QueryEngine::new(storage.clone()),
            storage,
            pipeline,
            pool,
            plugins,
            metrics,
        })
    }

    /// Drains the worker pool, closes plugins, and flushes storage.
    pub async fn shutdown(&self, drain: Duration) {
        self.pool.stop(drain).await;
        self.plugins.close_all();
        if let Err(e) = self.storage.close() {
            error!(error = %e, "error closing storage");
        }
    }
}
