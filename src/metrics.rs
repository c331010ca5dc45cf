//! Prometheus metrics for the identity core.
//!
//! - `tat_operation_total{operation}` - Core operations executed
//! - `tat_operation_duration_seconds{operation}` - Operation latency
//! - `tat_operation_errors_total{operation, error}` - Failed operations by error class
//! - `tat_effects_total{kind, result}` - Side effects delivered or failed
//! - `tat_effects_dropped_total` - Side effects rejected by a full or closed queue

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Operations processed by name (create_user, verify, add_favorite_topic, ...).
pub static OPERATION_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();

/// Operation latency by name.
pub static OPERATION_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Operation failures by name and error class.
pub static OPERATION_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Side effects by kind and result.
pub static EFFECTS: OnceLock<IntCounterVec> = OnceLock::new();

/// Side effects that never reached the worker.
pub static EFFECTS_DROPPED: OnceLock<IntCounter> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Called once at startup. Recording before `init` is a silent no-op.
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
                        tracing::error!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                    }
                }
            }
        };
    }

    register!(OPERATION_COUNTER, IntCounterVec::new(Opts::new("tat_operation_total", "Core operations processed by name"), &["operation"]));
    register!(OPERATION_LATENCY, HistogramVec::new(
        HistogramOpts::new("tat_operation_duration_seconds", "Core operation latency by name")
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        &["operation"]));
    register!(OPERATION_ERRORS, IntCounterVec::new(Opts::new("tat_operation_errors_total", "Core operation errors by name and class"), &["operation", "error"]));
    register!(EFFECTS, IntCounterVec::new(Opts::new("tat_effects_total", "Side effects by kind and result"), &["kind", "result"]));
    register!(EFFECTS_DROPPED, IntCounter::new("tat_effects_dropped_total", "Side effects dropped before dispatch"));
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
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

/// Record an operation execution with latency.
#[inline]
pub fn record_operation(operation: &str, duration_secs: f64) {
    if let Some(c) = OPERATION_COUNTER.get() {
        c.with_label_values(&[operation]).inc();
    }
    if let Some(h) = OPERATION_LATENCY.get() {
        h.with_label_values(&[operation]).observe(duration_secs);
    }
}

/// Record an operation error.
#[inline]
pub fn record_operation_error(operation: &str, error: &str) {
    if let Some(c) = OPERATION_ERRORS.get() {
        c.with_label_values(&[operation, error]).inc();
    }
}

/// Record the outcome of one side effect.
#[inline]
pub fn record_effect(kind: &str, delivered: bool) {
    if let Some(c) = EFFECTS.get() {
        let result = if delivered { "delivered" } else { "failed" };
        c.with_label_values(&[kind, result]).inc();
    }
}

/// Record a side effect dropped at submission.
#[inline]
pub fn record_effect_dropped() {
    if let Some(c) = EFFECTS_DROPPED.get() {
        c.inc();
    }
}
