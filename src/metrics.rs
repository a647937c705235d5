//! Prometheus metrics for filedash.
//!
//! Defines metric name constants, installs a global Prometheus recorder
//! using `metrics-exporter-prometheus`, and offers small recording helpers
//! the controllers call after every operation.  Without an installed
//! recorder the helpers are no-ops.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

// -- Metric name constants ----------------------------------------------------

/// Controller operations (counter). Labels: operation, outcome.
pub const SYNC_OPERATIONS_TOTAL: &str = "filedash_sync_operations_total";

/// Controller operation duration in seconds (histogram). Labels: operation.
pub const SYNC_OPERATION_DURATION_SECONDS: &str = "filedash_sync_operation_duration_seconds";

/// Bytes successfully uploaded (counter).
pub const BYTES_UPLOADED_TOTAL: &str = "filedash_bytes_uploaded_total";

/// Records currently in the local catalog (gauge).
pub const CATALOG_OBJECTS: &str = "filedash_catalog_objects";

/// Todo board operations (counter). Labels: operation, outcome.
pub const TODO_OPERATIONS_TOTAL: &str = "filedash_todo_operations_total";

// -- Global recorder installation ---------------------------------------------

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent. Returns the
/// global handle, or an error if another recorder is already installed.
pub fn init_metrics() -> anyhow::Result<&'static PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(SYNC_OPERATIONS_TOTAL, "File sync operations by type and outcome");
    describe_histogram!(
        SYNC_OPERATION_DURATION_SECONDS,
        "File sync operation duration in seconds"
    );
    describe_counter!(BYTES_UPLOADED_TOTAL, "Total bytes uploaded");
    describe_gauge!(CATALOG_OBJECTS, "Records in the local catalog");
    describe_counter!(TODO_OPERATIONS_TOTAL, "Todo board operations by type and outcome");
}

/// Prometheus exposition text, if the recorder is installed.
pub fn render() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(PrometheusHandle::render)
}

// -- Recording helpers --------------------------------------------------------

fn outcome(ok: bool) -> &'static str {
    if ok {
        "success"
    } else {
        "failure"
    }
}

pub fn record_sync_operation(operation: &'static str, ok: bool, elapsed_secs: f64) {
    counter!(SYNC_OPERATIONS_TOTAL, "operation" => operation, "outcome" => outcome(ok))
        .increment(1);
    histogram!(SYNC_OPERATION_DURATION_SECONDS, "operation" => operation).record(elapsed_secs);
}

pub fn record_bytes_uploaded(bytes: u64) {
    counter!(BYTES_UPLOADED_TOTAL).increment(bytes);
}

pub fn record_catalog_size(len: usize) {
    gauge!(CATALOG_OBJECTS).set(len as f64);
}

pub fn record_todo_operation(operation: &'static str, ok: bool) {
    counter!(TODO_OPERATIONS_TOTAL, "operation" => operation, "outcome" => outcome(ok))
        .increment(1);
}
