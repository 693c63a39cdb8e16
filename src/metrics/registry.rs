//! Prometheus metrics definitions and textfile export
//!
//! Runs are short-lived, so instead of serving `/metrics` the collected
//! values are written once, at exit, in the text exposition format picked
//! up by node-exporter's textfile collector.

use std::fs;
use std::path::Path;

use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

use crate::error::{Error, Result};

lazy_static::lazy_static! {
    /// Total number of runs by operation and outcome
    pub static ref OPERATIONS_TOTAL: CounterVec = register_counter_vec!(
        "ais_state_manager_operations_total",
        "Total number of state operations by outcome",
        &["operation", "outcome"]
    ).unwrap();

    /// Run duration histogram
    pub static ref OPERATION_DURATION: HistogramVec = register_histogram_vec!(
        "ais_state_manager_operation_duration_seconds",
        "Duration of state operations in seconds",
        &["operation"],
        vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]
    ).unwrap();

    /// Helper pods created
    pub static ref UNITS_DEPLOYED: CounterVec = register_counter_vec!(
        "ais_state_manager_units_deployed_total",
        "Total number of helper pods created",
        &["operation"]
    ).unwrap();

    /// Volume claims created during restore
    pub static ref VOLUMES_CREATED: CounterVec = register_counter_vec!(
        "ais_state_manager_volumes_created_total",
        "Total number of volume claims created",
        &["role"]
    ).unwrap();

    /// Files copied in or out of helper pods
    pub static ref TRANSFERS_TOTAL: CounterVec = register_counter_vec!(
        "ais_state_manager_transfers_total",
        "Total number of file transfers by direction",
        &["direction"]
    ).unwrap();
}

/// Record the outcome of a finished run
pub fn record_outcome(operation: &str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

/// Render every registered metric in the text exposition format
pub fn render() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| Error::config(format!("Failed to encode metrics: {}", e)))?;

    String::from_utf8(buffer)
        .map_err(|e| Error::config(format!("Metrics are not valid UTF-8: {}", e)))
}

/// Write metrics to `path`, atomically replacing any previous file
pub fn write_textfile(path: &Path) -> Result<()> {
    let rendered = render()?;
    let tmp = path.with_extension("prom.tmp");
    fs::write(&tmp, rendered)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
