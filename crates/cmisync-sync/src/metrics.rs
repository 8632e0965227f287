//! Prometheus metrics for the decision engine
//!
//! Tracks how strategies resolve events and which filters drop them.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Registry holding the engine's metrics under the `cmisync` namespace.
pub struct SyncMetrics {
    registry: Registry,
    /// Counter: strategy executions by (solver, outcome)
    pub solver_outcomes_total: IntCounterVec,
    /// Histogram: strategy execution time in seconds by solver
    pub solve_duration_seconds: HistogramVec,
    /// Counter: events dropped before detection, by filter reason
    pub filtered_events_total: IntCounterVec,
}

impl SyncMetrics {
    /// Creates a new `SyncMetrics` with all metrics registered.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some("cmisync".to_string()), None)?;

        let solver_outcomes_total = IntCounterVec::new(
            Opts::new("solver_outcomes_total", "Strategy executions by outcome"),
            &["solver", "outcome"],
        )?;
        registry.register(Box::new(solver_outcomes_total.clone()))?;

        let solve_duration_seconds = HistogramVec::new(
            HistogramOpts::new("solve_duration_seconds", "Strategy execution time in seconds")
                .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 30.0]),
            &["solver"],
        )?;
        registry.register(Box::new(solve_duration_seconds.clone()))?;

        let filtered_events_total = IntCounterVec::new(
            Opts::new("filtered_events_total", "Events dropped by the filters"),
            &["reason"],
        )?;
        registry.register(Box::new(filtered_events_total.clone()))?;

        Ok(Self {
            registry,
            solver_outcomes_total,
            solve_duration_seconds,
            filtered_events_total,
        })
    }

    // ========================================================================
    // Recording helpers
    // ========================================================================

    pub fn record_outcome(&self, solver: &str, outcome: &str) {
        self.solver_outcomes_total
            .with_label_values(&[solver, outcome])
            .inc();
    }

    pub fn observe_solve(&self, solver: &str, duration_secs: f64) {
        self.solve_duration_seconds
            .with_label_values(&[solver])
            .observe(duration_secs);
    }

    pub fn record_filtered(&self, reason: &str) {
        self.filtered_events_total.with_label_values(&[reason]).inc();
    }

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
