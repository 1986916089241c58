//! Metrics module
//!
//! Prometheus counters for uploader runs, cancel requests and leaked handles.

use crate::uploader::UploadOutcome;
use lazy_static::lazy_static;
use prometheus::{register_counter, register_counter_vec, Counter, CounterVec};
use prometheus::{Encoder, TextEncoder};

lazy_static! {
    pub static ref UPLOAD_RUNS_TOTAL: CounterVec = register_counter_vec!(
        "plf_upload_runs_total",
        "Completed PLF upload runs",
        &["outcome"]  // "success", "failure" or "canceled"
    ).unwrap();

    pub static ref CANCEL_REQUESTS_TOTAL: Counter = register_counter!(
        "plf_upload_cancel_requests_total",
        "Cancel requests forwarded to the engine"
    ).unwrap();

    pub static ref LEAKED_HANDLES_TOTAL: Counter = register_counter!(
        "plf_uploader_leaked_handles_total",
        "Uploaders dropped while initialized that could not be disposed"
    ).unwrap();
}

/// Record the end of a run
pub fn record_run_outcome(outcome: &UploadOutcome) {
    UPLOAD_RUNS_TOTAL.with_label_values(&[outcome.label()]).inc();
}

/// Record a cancel request
pub fn record_cancel_request() {
    CANCEL_REQUESTS_TOTAL.inc();
}

/// Record a handle whose safety-net disposal failed
pub fn record_leaked_handle() {
    LEAKED_HANDLES_TOTAL.inc();
}

/// Render the default registry in the Prometheus text format
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}
