//! Prometheus metrics for the bulk manager.
//!
//! Counters cover item outcomes, cycles, backend retries and health checks.
//! There is no HTTP endpoint: [`write_textfile`] dumps the registry in text
//! exposition format so a node exporter textfile collector can pick it up.

use std::path::Path;

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// Items
// =============================================================================

/// Items processed, by outcome.
pub static ITEMS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ferry_items_total", "Work items considered"),
        &["outcome"], // "completed", "already_done", "exhausted", "in_flight", "failed", "abandoned"
    )
    .unwrap()
});

/// Item failures, by stage.
pub static ITEM_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ferry_item_failures_total", "Recorded item failures"),
        &["stage"], // "fetch", "upload", "verify", "deadline", "internal"
    )
    .unwrap()
});

/// End-to-end processing time of items that were actually attempted.
pub static ITEM_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "ferry_item_duration_seconds",
            "Duration of fetch, upload and verify for one item",
        )
        .buckets(vec![1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]),
        &["result"],
    )
    .unwrap()
});

/// Local artifacts removed after verification.
pub static ARTIFACTS_DELETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "ferry_artifacts_deleted_total",
        "Local artifacts removed after a verified upload",
    )
    .unwrap()
});

/// Items currently claimed by a worker.
pub static ITEMS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("ferry_items_in_flight", "Items currently being processed").unwrap()
});

// =============================================================================
// Cycles and backends
// =============================================================================

/// Completed cycles.
pub static CYCLES_TOTAL: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("ferry_cycles_total", "Completed manager cycles").unwrap());

/// Wall-clock duration of a full cycle.
pub static CYCLE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("ferry_cycle_duration_seconds", "Duration of one manager cycle")
            .buckets(vec![1.0, 10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0]),
        &[],
    )
    .unwrap()
});

/// Backend retry attempts, by operation.
pub static RETRY_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ferry_retry_attempts_total", "Backend operation retries"),
        &["op"], // "fetch", "upload", "rclone_listremotes"
    )
    .unwrap()
});

/// Health gate evaluations, by result.
pub static HEALTH_CHECKS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ferry_health_checks_total", "Health gate evaluations"),
        &["result"], // "ok", "failed"
    )
    .unwrap()
});

/// Current number of completion and failure records.
pub static RECORDS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("ferry_records", "Persisted records by kind"),
        &["kind"], // "completed", "failed", "exhausted"
    )
    .unwrap()
});

/// Register all metrics with the given registry.
fn register_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ITEMS_TOTAL.clone()),
        Box::new(ITEM_FAILURES.clone()),
        Box::new(ITEM_DURATION.clone()),
        Box::new(ARTIFACTS_DELETED.clone()),
        Box::new(ITEMS_IN_FLIGHT.clone()),
        Box::new(CYCLES_TOTAL.clone()),
        Box::new(CYCLE_DURATION.clone()),
        Box::new(RETRY_ATTEMPTS.clone()),
        Box::new(HEALTH_CHECKS.clone()),
        Box::new(RECORDS.clone()),
    ];
    for collector in collectors {
        registry.register(collector).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Atomically replace `path` with the current metrics.
pub fn write_textfile(path: &Path) -> std::io::Result<()> {
    let body = encode_metrics().map_err(std::io::Error::other)?;
    crate::state::atomic_write(path, body.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_registered_metrics() {
        CYCLES_TOTAL.inc();
        ITEMS_TOTAL.with_label_values(&["completed"]).inc();

        let text = encode_metrics().unwrap();
        assert!(text.contains("ferry_cycles_total"));
        assert!(text.contains("ferry_items_total{outcome=\"completed\"}"));
    }

    #[test]
    fn test_write_textfile() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ferry.prom");
        CYCLES_TOTAL.inc();
        write_textfile(&path).unwrap();
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .contains("ferry_cycles_total"));
    }
}
