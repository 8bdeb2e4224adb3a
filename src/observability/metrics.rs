//! Prometheus metrics for drop_gate.
//!
//! Covers both sides of the hand-off: admission outcomes and queue length in
//! the waiting room, throughput, wait and idle time in the worker pool.

use prometheus::{
    Counter, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Prometheus metrics registry with all simulation metrics.
pub struct Metrics {
    registry: Registry,

    // === Waiting room ===
    /// Requests handed to the pool before their timeout
    pub requests_admitted_total: IntCounter,

    /// Requests dropped because no worker took them in time
    pub requests_dropped_total: IntCounter,

    /// Admission attempts currently in flight
    pub queue_length: IntGauge,

    // === Worker pool ===
    /// Requests executed by workers
    pub requests_processed_total: IntCounter,

    /// Time between request creation and start of execution
    pub request_wait_seconds: Histogram,

    /// Cumulative time workers spent without a request
    pub worker_idle_seconds_total: Counter,

    /// Workers currently executing a request
    pub workers_busy: IntGauge,

    /// Configured worker count
    pub workers_total: IntGauge,

    /// 1 while the pool is halted
    pub pool_halted: IntGauge,
}

impl Metrics {
    /// Create a new metrics registry with all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Wait buckets (in seconds), from sub-millisecond hand-offs up to halt-length stalls
        let wait_buckets = vec![
            0.0001, 0.001, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ];

        let requests_admitted_total = IntCounter::with_opts(Opts::new(
            "drop_gate_requests_admitted_total",
            "Requests handed to the worker pool within their timeout",
        ))?;
        registry.register(Box::new(requests_admitted_total.clone()))?;

        let requests_dropped_total = IntCounter::with_opts(Opts::new(
            "drop_gate_requests_dropped_total",
            "Requests dropped because the pool did not take them within their timeout",
        ))?;
        registry.register(Box::new(requests_dropped_total.clone()))?;

        let queue_length = IntGauge::with_opts(Opts::new(
            "drop_gate_queue_length",
            "Requests currently waiting in the waiting room for a worker",
        ))?;
        registry.register(Box::new(queue_length.clone()))?;

        let requests_processed_total = IntCounter::with_opts(Opts::new(
            "drop_gate_requests_processed_total",
            "Requests executed by the worker pool",
        ))?;
        registry.register(Box::new(requests_processed_total.clone()))?;

        let request_wait_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "drop_gate_request_wait_seconds",
                "Time between request creation and start of execution in seconds",
            )
            .buckets(wait_buckets),
        )?;
        registry.register(Box::new(request_wait_seconds.clone()))?;

        let worker_idle_seconds_total = Counter::with_opts(Opts::new(
            "drop_gate_worker_idle_seconds_total",
            "Cumulative time workers spent waiting for a request in seconds",
        ))?;
        registry.register(Box::new(worker_idle_seconds_total.clone()))?;

        let workers_busy = IntGauge::with_opts(Opts::new(
            "drop_gate_workers_busy",
            "Workers currently executing a request",
        ))?;
        registry.register(Box::new(workers_busy.clone()))?;

        let workers_total = IntGauge::with_opts(Opts::new(
            "drop_gate_workers_total",
            "Configured number of workers",
        ))?;
        registry.register(Box::new(workers_total.clone()))?;

        let pool_halted = IntGauge::with_opts(Opts::new(
            "drop_gate_pool_halted",
            "1 while the worker pool is halted, 0 otherwise",
        ))?;
        registry.register(Box::new(pool_halted.clone()))?;

        Ok(Self {
            registry,
            requests_admitted_total,
            requests_dropped_total,
            queue_length,
            requests_processed_total,
            request_wait_seconds,
            worker_idle_seconds_total,
            workers_busy,
            workers_total,
            pool_halted,
        })
    }

    /// Record the outcome of one admission attempt.
    pub fn record_admission(&self, admitted: bool) {
        if admitted {
            self.requests_admitted_total.inc();
        } else {
            self.requests_dropped_total.inc();
        }
    }

    /// Record a request picked up by a worker.
    pub fn record_processed(&self, wait: Duration) {
        self.requests_processed_total.inc();
        self.request_wait_seconds.observe(wait.as_secs_f64());
    }

    /// Record time a worker spent idle.
    pub fn record_idle(&self, idle: Duration) {
        self.worker_idle_seconds_total.inc_by(idle.as_secs_f64());
    }

    /// Update the halted flag.
    pub fn set_halted(&self, halted: bool) {
        self.pool_halted.set(i64::from(halted));
    }

    /// Export metrics in Prometheus text format.
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!(error = %e, "failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Get the Prometheus registry (for custom metrics).
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
