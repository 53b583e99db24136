//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters and gauges the download service cares about: task
//!   throughput, daemon events and HTTP traffic.

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    http_requests_total: IntCounterVec,
    daemon_events_total: IntCounterVec,
    tasks_finished_total: IntCounterVec,
    tasks_submitted_total: IntCounter,
    tasks_rejected_total: IntCounter,
    active_tasks: IntGauge,
    queued_tasks: IntGauge,
    tracked_tasks: IntGauge,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Tasks currently downloading or uploading.
    pub active_tasks: i64,
    /// Tasks accepted but waiting for a worker slot.
    pub queued_tasks: i64,
    /// Tasks whose status is still retained.
    pub tracked_tasks: i64,
    /// Total tasks accepted.
    pub tasks_submitted_total: u64,
    /// Total requests refused before a task was created.
    pub tasks_rejected_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let http_requests_total = counter_vec(
            "http_requests_total",
            "Total HTTP requests received",
            &["route", "code"],
        )?;
        let daemon_events_total = counter_vec(
            "daemon_events_total",
            "Download daemon notifications received by kind",
            &["kind"],
        )?;
        let tasks_finished_total = counter_vec(
            "tasks_finished_total",
            "Download tasks that reached a terminal state by outcome",
            &["outcome"],
        )?;
        let tasks_submitted_total =
            counter("tasks_submitted_total", "Download tasks accepted for execution")?;
        let tasks_rejected_total = counter(
            "tasks_rejected_total",
            "Download requests refused by policy or validation",
        )?;
        let active_tasks = gauge("active_tasks", "Download tasks currently executing")?;
        let queued_tasks = gauge("queued_tasks", "Download tasks waiting for a worker")?;
        let tracked_tasks = gauge("tracked_tasks", "Task statuses retained for lookup")?;

        register(&registry, "http_requests_total", &http_requests_total)?;
        register(&registry, "daemon_events_total", &daemon_events_total)?;
        register(&registry, "tasks_finished_total", &tasks_finished_total)?;
        register(&registry, "tasks_submitted_total", &tasks_submitted_total)?;
        register(&registry, "tasks_rejected_total", &tasks_rejected_total)?;
        register(&registry, "active_tasks", &active_tasks)?;
        register(&registry, "queued_tasks", &queued_tasks)?;
        register(&registry, "tracked_tasks", &tracked_tasks)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                http_requests_total,
                daemon_events_total,
                tasks_finished_total,
                tasks_submitted_total,
                tasks_rejected_total,
                active_tasks,
                queued_tasks,
                tracked_tasks,
            }),
        })
    }

    /// Increment the HTTP request counter for the given route and status code.
    pub fn inc_http_request(&self, route: &str, status: u16) {
        self.inner
            .http_requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }

    /// Increment the daemon notification counter for `kind`.
    pub fn inc_daemon_event(&self, kind: &str) {
        self.inner
            .daemon_events_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Count an accepted task.
    pub fn inc_task_submitted(&self) {
        self.inner.tasks_submitted_total.inc();
    }

    /// Count a refused request.
    pub fn inc_task_rejected(&self) {
        self.inner.tasks_rejected_total.inc();
    }

    /// Count a task reaching a terminal state (`done` or `error`).
    pub fn inc_task_finished(&self, outcome: &str) {
        self.inner
            .tasks_finished_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Adjust the executing-task gauge by `delta`.
    pub fn add_active_tasks(&self, delta: i64) {
        self.inner.active_tasks.add(delta);
    }

    /// Adjust the queued-task gauge by `delta`.
    pub fn add_queued_tasks(&self, delta: i64) {
        self.inner.queued_tasks.add(delta);
    }

    /// Set the retained-task gauge.
    pub fn set_tracked_tasks(&self, count: i64) {
        self.inner.tracked_tasks.set(count);
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
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a point-in-time snapshot of the most relevant gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_tasks: self.inner.active_tasks.get(),
            queued_tasks: self.inner.queued_tasks.get(),
            tracked_tasks: self.inner.tracked_tasks.get(),
            tasks_submitted_total: self.inner.tasks_submitted_total.get(),
            tasks_rejected_total: self.inner.tasks_rejected_total.get(),
        }
    }
}

fn counter(name: &'static str, help: &str) -> Result<IntCounter> {
    IntCounter::with_opts(Opts::new(name, help))
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn counter_vec(name: &'static str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn gauge(name: &'static str, help: &str) -> Result<IntGauge> {
    IntGauge::with_opts(Opts::new(name, help))
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}
