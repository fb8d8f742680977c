use std::sync::Arc;

use prometheus::{
    Counter, Encoder, Gauge, Histogram, Registry, TextEncoder, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_with_registry,
};

/// Process-scoped metrics, registered against an explicit registry and passed
/// as a collaborator reference so tests can construct isolated instances.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    // Pipeline counters
    pub batches_received: Counter,
    pub entries_received: Counter,
    pub entries_processed: Counter,
    pub entries_filtered: Counter,
    pub entries_errored: Counter,
    pub plugin_errors: Counter,
    pub processing_time: Histogram,

    // Worker pool
    pub workers_active: Gauge,
    pub work_queue_depth: Gauge,
    pub jobs_processed: Counter,
    pub jobs_dropped: Counter,
    pub jobs_panicked: Counter,
    pub worker_time: Histogram,
}

impl Metrics {
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            batches_received: register_counter_with_registry!(
                "havn_log_batches_received_total",
                "Total number of log batches received",
                registry
            )?,
            entries_received: register_counter_with_registry!(
                "havn_log_entries_received_total",
                "Total number of log entries received",
                registry
            )?,
            entries_processed: register_counter_with_registry!(
                "havn_log_entries_processed_total",
                "Total number of log entries successfully processed",
                registry
            )?,
            entries_filtered: register_counter_with_registry!(
                "havn_log_entries_filtered_total",
                "Total number of log entries filtered out",
                registry
            )?,
            entries_errored: register_counter_with_registry!(
                "havn_log_entries_errored_total",
                "Total number of log entries that failed processing",
                registry
            )?,
            plugin_errors: register_counter_with_registry!(
                "havn_plugin_errors_total",
                "Total number of plugin processing errors",
                registry
            )?,
            processing_time: register_histogram_with_registry!(
                "havn_log_processing_duration_seconds",
                "Time taken to process a log entry",
                registry
            )?,
            workers_active: register_gauge_with_registry!(
                "havn_workers_active",
                "Number of active workers in the pool",
                registry
            )?,
            work_queue_depth: register_gauge_with_registry!(
                "havn_work_queue_depth",
                "Current depth of the work queue",
                registry
            )?,
            jobs_processed: register_counter_with_registry!(
                "havn_work_items_processed_total",
                "Total number of work items processed",
                registry
            )?,
            jobs_dropped: register_counter_with_registry!(
                "havn_work_items_dropped_total",
                "Total number of work items dropped because the queue was full",
                registry
            )?,
            jobs_panicked: register_counter_with_registry!(
                "havn_work_items_panicked_total",
                "Total number of work items that panicked",
                registry
            )?,
            worker_time: register_histogram_with_registry!(
                "havn_worker_processing_duration_seconds",
                "Time a worker spent on a single work item",
                registry
            )?,
            registry,
        })
    }

    /// Creates a metrics instance on a fresh private registry.
    pub fn unregistered() -> Arc<Self> {
        // A fresh registry cannot produce duplicate-registration errors.
        Arc::new(Self::new(Arc::new(Registry::new())).expect("fresh registry"))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Renders all registered metrics in the Prometheus text format.
    pub fn export_text(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_on_private_registry() {
        let metrics = Metrics::unregistered();
        metrics.entries_processed.inc();
        metrics.work_queue_depth.set(3.0);
        let text = metrics.export_text().unwrap();
        assert!(text.contains("havn_log_entries_processed_total 1"));
        assert!(text.contains("havn_work_queue_depth 3"));
    }

    #[test]
    fn two_instances_do_not_collide() {
        let a = Metrics::unregistered();
        let b = Metrics::unregistered();
        a.entries_processed.inc();
        assert_eq!(b.entries_processed.get(), 0.0);
    }
}
