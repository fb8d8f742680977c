pub mod filter;
pub mod transform;

use std::sync::{Arc, RwLock};
use std::time::Instant;

use tracing::warn;

use crate::domain::LogEntry;
use crate::error::Result;
use crate::metrics::Metrics;
use crate::parser::{Parser, default_parsers};
use crate::plugin::Plugin;
use crate::storage::Storage;
use crate::worker::WorkerPool;

pub use filter::Filter;
pub use transform::Transformer;

/// The per-entry processing pipeline: parse, filter, transform, plugin,
/// store. Each entry of a batch becomes one job on the worker pool.
///
/// Per-entry outcomes never fail the batch; they surface through the
/// `processed` / `filtered` / `errored` counters.
pub struct Pipeline {
    storage: Arc<dyn Storage>,
    pool: Arc<WorkerPool>,
    parsers: Arc<Vec<Box<dyn Parser>>>,
    filters: RwLock<Vec<Arc<dyn Filter>>>,
    transformers: RwLock<Vec<Arc<dyn Transformer>>>,
    plugins: RwLock<Vec<Arc<dyn Plugin>>>,
    metrics: Arc<Metrics>,
}

impl Pipeline {
    pub fn new(storage: Arc<dyn Storage>, pool: Arc<WorkerPool>, metrics: Arc<Metrics>) -> Self {
        Self {
            storage,
            pool,
            parsers: Arc::new(default_parsers()),
            filters: RwLock::new(Vec::new()),
            transformers: RwLock::new(Vec::new()),
            plugins: RwLock::new(Vec::new()),
            metrics,
        }
    }

    pub fn with_parsers(mut self, parsers: Vec<Box<dyn Parser>>) -> Self {
        self.parsers = Arc::new(parsers);
        self
    }

    /// Safe to call concurrently with `process`; running jobs keep the
    /// snapshot they started with.
    pub fn add_filter(&self, filter: Arc<dyn Filter>) {
        self.filters
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(filter);
    }

    pub fn add_transformer(&self, transformer: Arc<dyn Transformer>) {
        self.transformers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(transformer);
    }

    pub fn add_plugin(&self, plugin: Arc<dyn Plugin>) {
        self.plugins
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(plugin);
    }

    /// Submits one worker job per entry and returns immediately. Fails only
    /// when the pool no longer accepts submissions.
    pub fn process(&self, entries: Vec<LogEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        self.metrics.batches_received.inc();
        self.metrics.entries_received.inc_by(entries.len() as f64);

        // One snapshot per batch; configuration changes apply to later
        // batches.
        let filters = self
            .filters
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        let transformers = self
            .transformers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        let plugins = self
            .plugins
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        for entry in entries {
            let stage = Stage {
                storage: self.storage.clone(),
                parsers: self.parsers.clone(),
                filters: filters.clone(),
                transformers: transformers.clone(),
                plugins: plugins.clone(),
                metrics: self.metrics.clone(),
            };
            self.pool.submit(Box::new(move || stage.run(entry)))?;
        }

        Ok(())
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

/// Everything one job needs, captured by value so the closure is `'static`.
struct Stage {
    storage: Arc<dyn Storage>,
    parsers: Arc<Vec<Box<dyn Parser>>>,
    filters: Vec<Arc<dyn Filter>>,
    transformers: Vec<Arc<dyn Transformer>>,
    plugins: Vec<Arc<dyn Plugin>>,
    metrics: Arc<Metrics>,
}

impl Stage {
    fn run(self, mut entry: LogEntry) {
        let start = Instant::now();

        // Parse raw data when the entry arrived unparsed. First parser whose
        // sniff and parse both succeed wins.
        if !entry.raw.is_empty() && (entry.message.is_empty() || entry.fields.is_empty()) {
            for parser in self.parsers.iter() {
                if parser.can_parse(&entry.raw) && parser.parse(&mut entry).is_ok() {
                    break;
                }
            }
            if entry.message.is_empty() {
                entry.message = entry.raw.clone();
            }
        }

        for filter in &self.filters {
            if !filter.apply(&entry) {
                self.metrics.entries_filtered.inc();
                return;
            }
        }

        for transformer in &self.transformers {
            transformer.transform(&mut entry);
        }

        for plugin in &self.plugins {
            if let Err(e) = plugin.process(&mut entry) {
                self.metrics.plugin_errors.inc();
                warn!(plugin = plugin.name(), error = %e, "plugin failed to process entry");
            }
        }

        if let Err(e) = self.storage.store(entry) {
            self.metrics.entries_errored.inc();
            warn!(error = %e, "failed to store entry");
            return;
        }

        self.metrics.entries_processed.inc();
        self.metrics
            .processing_time
            .observe(start.elapsed().as_secs_f64());
    }
}
