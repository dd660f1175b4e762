//! # Prometheus Metrics
//!
//! Operation counters for a scenario run, rendered in the Prometheus text
//! exposition format when `--metrics` is passed.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Holds all Prometheus metric handles for the simulator.
#[derive(Clone)]
pub struct SimulatorMetrics {
    registry: Registry,
    /// Operations attempted, by operation name.
    pub operations_total: IntCounterVec,
    /// Operations that returned an error, by operation name and error kind.
    pub operation_failures_total: IntCounterVec,
    /// Wall-clock time spent inside the engine per operation.
    pub operation_latency_seconds: HistogramVec,
    /// Current value of the simulated clock.
    pub clock_seconds: IntGauge,
}

impl SimulatorMetrics {
    /// Creates and registers all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("microlend".into()), None)?;

        let operations_total = IntCounterVec::new(
            Opts::new("operations_total", "Ledger operations attempted"),
            &["op"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let operation_failures_total = IntCounterVec::new(
            Opts::new("operation_failures_total", "Ledger operations that failed"),
            &["op", "kind"],
        )?;
        registry.register(Box::new(operation_failures_total.clone()))?;

        let operation_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "operation_latency_seconds",
                "Time spent executing one ledger operation",
            )
            .buckets(vec![0.00001, 0.0001, 0.001, 0.01, 0.1, 1.0]),
            &["op"],
        )?;
        registry.register(Box::new(operation_latency_seconds.clone()))?;

        let clock_seconds = IntGauge::new("clock_seconds", "Simulated clock, UNIX seconds")?;
        registry.register(Box::new(clock_seconds.clone()))?;

        Ok(Self {
            registry,
            operations_total,
            operation_failures_total,
            operation_latency_seconds,
            clock_seconds,
        })
    }

    /// Count one operation and, if it failed, its error kind.
    pub fn observe(&self, op: &str, seconds: f64, failure: Option<&str>) {
        self.operations_total.with_label_values(&[op]).inc();
        self.operation_latency_seconds
            .with_label_values(&[op])
            .observe(seconds);
        if let Some(kind) = failure {
            self.operation_failures_total
                .with_label_values(&[op, kind])
                .inc();
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_are_labelled_by_kind() {
        let metrics = SimulatorMetrics::new().unwrap();
        metrics.observe("deposit_to_pool", 0.001, None);
        metrics.observe("repay_loan", 0.001, Some("InvalidState"));

        assert_eq!(
            metrics.operations_total.with_label_values(&["deposit_to_pool"]).get(),
            1
        );
        assert_eq!(
            metrics
                .operation_failures_total
                .with_label_values(&["repay_loan", "InvalidState"])
                .get(),
            1
        );

        let text = metrics.encode().unwrap();
        assert!(text.contains("microlend_operations_total"));
        assert!(text.contains("kind=\"InvalidState\""));
    }
}
