//! Metrics for node store operations.

use std::time::Instant;

use opentelemetry::{
    metrics::{Counter, Histogram},
    KeyValue,
};

pub fn low_latency_boundaries() -> Vec<f64> {
    vec![
        0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0,
    ]
}

/// Operation latencies and error counts, labelled by `operation`.
#[derive(Debug, Clone)]
pub struct NodeStoreMetrics {
    pub operations: Histogram<f64>,
    pub errors: Counter<u64>,
}

impl Default for NodeStoreMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeStoreMetrics {
    pub fn new() -> Self {
        let meter = opentelemetry::global::meter("node-store");

        let operations = meter
            .f64_histogram("node_store.operation_duration")
            .with_unit("s")
            .with_boundaries(low_latency_boundaries())
            .with_description("node store operation latencies in seconds")
            .build();

        let errors = meter
            .u64_counter("node_store.errors")
            .with_description("node store operations that returned an error")
            .build();

        Self { operations, errors }
    }

    pub fn timer(&self, operation: &'static str) -> Timer {
        Timer::start_with_labels(&self.operations, &[KeyValue::new("operation", operation)])
    }

    pub fn record_error(&self, operation: &'static str) {
        self.errors.add(1, &[KeyValue::new("operation", operation)]);
    }
}

/// Records the elapsed time into a histogram when dropped.
pub struct Timer {
    start: Instant,
    histogram: Histogram<f64>,
    labels: Vec<KeyValue>,
}

impl Timer {
    pub fn start_with_labels(histogram: &Histogram<f64>, labels: &[KeyValue]) -> Self {
        Self {
            start: Instant::now(),
            histogram: histogram.clone(),
            labels: labels.to_vec(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.record(duration, &self.labels);
    }
}
