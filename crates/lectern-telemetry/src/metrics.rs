//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters/gauges the dispatch and repair pipelines update.

use std::fs;
use std::path::{Path, PathBuf};

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: std::sync::Arc<MetricsInner>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

struct MetricsInner {
    registry: Registry,
    endpoint_probes_total: IntCounterVec,
    dispatch_attempts_total: IntCounterVec,
    queued_tasks: IntGauge,
    repair_decisions_total: IntCounterVec,
    repair_executions_total: IntCounterVec,
}

/// Snapshot of selected gauges and counters for operator output.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Tasks currently parked in the durable queue.
    pub queued_tasks: i64,
    /// Replacement evaluations that ended in approval.
    pub repair_approved_total: u64,
    /// Replacement evaluations that ended in rejection.
    pub repair_rejected_total: u64,
    /// Replacement executions that completed successfully.
    pub repair_executions_succeeded_total: u64,
    /// Replacement executions that failed at any stage.
    pub repair_executions_failed_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let endpoint_probes_total = IntCounterVec::new(
            Opts::new(
                "endpoint_probes_total",
                "Execution endpoint health probes by resulting status",
            ),
            &["endpoint", "status"],
        )
        .map_err(defining("endpoint_probes_total"))?;
        let dispatch_attempts_total = IntCounterVec::new(
            Opts::new(
                "dispatch_attempts_total",
                "Task submission attempts by endpoint and outcome",
            ),
            &["endpoint", "outcome"],
        )
        .map_err(defining("dispatch_attempts_total"))?;
        let queued_tasks = IntGauge::with_opts(Opts::new(
            "queued_tasks",
            "Tasks waiting in the durable queue",
        ))
        .map_err(defining("queued_tasks"))?;
        let repair_decisions_total = IntCounterVec::new(
            Opts::new(
                "repair_decisions_total",
                "Replacement evaluations by decision",
            ),
            &["decision"],
        )
        .map_err(defining("repair_decisions_total"))?;
        let repair_executions_total = IntCounterVec::new(
            Opts::new(
                "repair_executions_total",
                "Replacement executions by outcome",
            ),
            &["outcome"],
        )
        .map_err(defining("repair_executions_total"))?;

        register(&registry, "endpoint_probes_total", &endpoint_probes_total)?;
        register(&registry, "dispatch_attempts_total", &dispatch_attempts_total)?;
        register(&registry, "queued_tasks", &queued_tasks)?;
        register(&registry, "repair_decisions_total", &repair_decisions_total)?;
        register(&registry, "repair_executions_total", &repair_executions_total)?;

        Ok(Self {
            inner: std::sync::Arc::new(MetricsInner {
                registry,
                endpoint_probes_total,
                dispatch_attempts_total,
                queued_tasks,
                repair_decisions_total,
                repair_executions_total,
            }),
        })
    }

    /// Increment the probe counter for an endpoint and its resulting status label.
    pub fn inc_endpoint_probe(&self, endpoint: &str, status: &str) {
        self.inner
            .endpoint_probes_total
            .with_label_values(&[endpoint, status])
            .inc();
    }

    /// Increment the submission attempt counter.
    pub fn inc_dispatch_attempt(&self, endpoint: &str, outcome: &str) {
        self.inner
            .dispatch_attempts_total
            .with_label_values(&[endpoint, outcome])
            .inc();
    }

    /// Set the durable queue depth gauge.
    pub fn set_queued_tasks(&self, depth: usize) {
        self.inner
            .queued_tasks
            .set(i64::try_from(depth).unwrap_or(i64::MAX));
    }

    /// Increment the replacement decision counter (`approved` / `rejected`).
    pub fn inc_repair_decision(&self, decision: &str) {
        self.inner
            .repair_decisions_total
            .with_label_values(&[decision])
            .inc();
    }

    /// Increment the replacement execution counter (`succeeded` / `failed`).
    pub fn inc_repair_execution(&self, outcome: &str) {
        self.inner
            .repair_executions_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::Render { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::RenderEncoding { source })
    }

    /// Write the rendered registry to a node-exporter textfile.
    ///
    /// The file is written next to its final location and renamed into place so
    /// a scraper never observes a partially written file.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails or the file cannot be written.
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        let rendered = self.render()?;
        let mut staging = path.as_os_str().to_owned();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);
        fs::write(&staging, rendered).map_err(|source| TelemetryError::Textfile {
            path: staging.clone(),
            source,
        })?;
        fs::rename(&staging, path).map_err(|source| TelemetryError::Textfile {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Take a point-in-time snapshot of the most relevant gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let decisions = &self.inner.repair_decisions_total;
        let executions = &self.inner.repair_executions_total;
        MetricsSnapshot {
            queued_tasks: self.inner.queued_tasks.get(),
            repair_approved_total: decisions.with_label_values(&["approved"]).get(),
            repair_rejected_total: decisions.with_label_values(&["rejected"]).get(),
            repair_executions_succeeded_total: executions.with_label_values(&["succeeded"]).get(),
            repair_executions_failed_total: executions.with_label_values(&["failed"]).get(),
        }
    }
}

fn defining(metric: &'static str) -> impl FnOnce(prometheus::Error) -> TelemetryError {
    move |source| TelemetryError::metric("metrics.define", metric, source)
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::metric("metrics.register", name, source))
}
