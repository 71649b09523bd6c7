//! Prometheus metrics for the session engine.
//!
//! - `sessions_operations_started_total{kind}` - operations constructed by kind
//! - `sessions_operations_completed_total{kind}` - operations that reached Off normally
//! - `sessions_operations_killed_total{kind,code}` - operations aborted via Kill
//! - `sessions_operations_in_flight` - operations currently alive
//! - `sessions_operation_duration_seconds{kind}` - Start-to-Off latency
//! - `sessions_requests_rejected_total{reason}` - requests refused before construction

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters
// ========================================================================

pub static OPERATIONS_STARTED: OnceLock<IntCounterVec> = OnceLock::new();

pub static OPERATIONS_COMPLETED: OnceLock<IntCounterVec> = OnceLock::new();

/// Killed operations by kind and error code.
pub static OPERATIONS_KILLED: OnceLock<IntCounterVec> = OnceLock::new();

/// Requests refused by the dispatcher (bad digest, duplicate, not logged in).
pub static REQUESTS_REJECTED: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Gauges / histograms
// ========================================================================

pub static OPERATIONS_IN_FLIGHT: OnceLock<IntGauge> = OnceLock::new();

pub static OPERATION_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            if $metric.get().is_none() {
                match $init {
                    Ok(m) => {
                        if let Err(e) = r.register(Box::new(m.clone())) {
                            tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                        }
                        let _ = $metric.set(m);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                    }
                }
            }
        };
    }

    register!(OPERATIONS_STARTED, IntCounterVec::new(Opts::new("sessions_operations_started_total", "Operations started by kind"), &["kind"]));
    register!(OPERATIONS_COMPLETED, IntCounterVec::new(Opts::new("sessions_operations_completed_total", "Operations completed by kind"), &["kind"]));
    register!(OPERATIONS_KILLED, IntCounterVec::new(Opts::new("sessions_operations_killed_total", "Operations killed by kind and error code"), &["kind", "code"]));
    register!(REQUESTS_REJECTED, IntCounterVec::new(Opts::new("sessions_requests_rejected_total", "Requests refused before an operation was started"), &["reason"]));
    register!(OPERATIONS_IN_FLIGHT, IntGauge::new("sessions_operations_in_flight", "Operations currently alive"));
    register!(OPERATION_DURATION, HistogramVec::new(
        HistogramOpts::new("sessions_operation_duration_seconds", "Operation latency from Start to Off")
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["kind"]));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

// ============================================================================
// Recording helpers
// ============================================================================

#[inline]
pub fn record_started(kind: &str) {
    if let Some(c) = OPERATIONS_STARTED.get() {
        c.with_label_values(&[kind]).inc();
    }
    if let Some(g) = OPERATIONS_IN_FLIGHT.get() {
        g.inc();
    }
}

#[inline]
pub fn record_completed(kind: &str, duration_secs: f64) {
    if let Some(c) = OPERATIONS_COMPLETED.get() {
        c.with_label_values(&[kind]).inc();
    }
    finish(kind, duration_secs);
}

#[inline]
pub fn record_killed(kind: &str, code: &str, duration_secs: f64) {
    if let Some(c) = OPERATIONS_KILLED.get() {
        c.with_label_values(&[kind, code]).inc();
    }
    finish(kind, duration_secs);
}

#[inline]
pub fn record_rejected(reason: &str) {
    if let Some(c) = REQUESTS_REJECTED.get() {
        c.with_label_values(&[reason]).inc();
    }
}

fn finish(kind: &str, duration_secs: f64) {
    if let Some(g) = OPERATIONS_IN_FLIGHT.get() {
        g.dec();
    }
    if let Some(h) = OPERATION_DURATION.get() {
        h.with_label_values(&[kind]).observe(duration_secs);
    }
}
