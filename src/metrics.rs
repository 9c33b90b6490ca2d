//! Metrics and telemetry for the burst clustering pipeline
//!
//! Prometheus metrics covering extraction volume, clustering cost and the
//! distributed exchange. Metrics live in the default registry and are
//! rendered with [`gather_metrics`].

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, register_int_gauge,
    CounterVec, Encoder, HistogramVec, IntCounter, IntGauge, TextEncoder,
};
use std::time::Duration;

lazy_static! {
    // === Extraction ===

    /// Sealed bursts by resulting kind
    pub static ref BURSTS_TOTAL: CounterVec = register_counter_vec!(
        "bursts_sealed_total",
        "Total bursts sealed by the assembler, by kind",
        &["kind"]
    ).unwrap();

    /// Input records consumed
    pub static ref RECORDS_TOTAL: CounterVec = register_counter_vec!(
        "bursts_records_total",
        "Total trace records consumed, by record kind",
        &["kind"]
    ).unwrap();

    // === Clustering ===

    /// Epsilon range queries issued
    pub static ref RANGE_QUERIES_TOTAL: IntCounter = register_int_counter!(
        "bursts_range_queries_total",
        "Total epsilon range queries issued by DBSCAN"
    ).unwrap();

    /// Clusters found by the last run
    pub static ref CLUSTERS_FORMED: IntGauge = register_int_gauge!(
        "bursts_clusters_formed",
        "Clusters formed by the most recent clustering run"
    ).unwrap();

    /// Clustering stage latency
    pub static ref STAGE_DURATION: HistogramVec = register_histogram_vec!(
        "bursts_stage_duration_seconds",
        "Pipeline stage latency in seconds",
        &["stage"],
        vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]
    ).unwrap();

    // === Distributed exchange ===

    /// Reconciliation messages by direction and type
    pub static ref EXCHANGE_MESSAGES_TOTAL: CounterVec = register_counter_vec!(
        "bursts_exchange_messages_total",
        "Messages exchanged during partition reconciliation",
        &["direction", "message"]
    ).unwrap();

    /// Errors by component
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "bursts_errors_total",
        "Total errors by component",
        &["component"]
    ).unwrap();
}

/// Record a sealed burst
pub fn record_burst(kind: &str) {
    BURSTS_TOTAL.with_label_values(&[kind]).inc();
}

/// Record a consumed input record
pub fn record_input(kind: &str) {
    RECORDS_TOTAL.with_label_values(&[kind]).inc();
}

/// Record the outcome of one clustering run
pub fn record_clustering_run(range_queries: u64, clusters: usize, elapsed: Duration) {
    RANGE_QUERIES_TOTAL.inc_by(range_queries);
    CLUSTERS_FORMED.set(clusters as i64);
    record_stage("clustering", elapsed);
}

/// Record the latency of a pipeline stage
pub fn record_stage(stage: &str, elapsed: Duration) {
    STAGE_DURATION
        .with_label_values(&[stage])
        .observe(elapsed.as_secs_f64());
}

/// Record one exchanged message
pub fn record_message(direction: &str, message: &str) {
    EXCHANGE_MESSAGES_TOTAL
        .with_label_values(&[direction, message])
        .inc();
}

/// Record an error in a component
pub fn record_error(component: &str) {
    ERRORS_TOTAL.with_label_values(&[component]).inc();
}

/// Render all registered metrics in the Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_rendered() {
        record_burst("complete");
        record_stage("extraction", Duration::from_millis(3));
        record_message("recv", "size");

        let text = gather_metrics();
        assert!(text.contains("bursts_sealed_total"));
        assert!(text.contains("bursts_stage_duration_seconds"));
        assert!(text.contains("bursts_exchange_messages_total"));
    }
}
