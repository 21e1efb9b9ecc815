//! Metrics module for tax-service.
//! Prometheus metrics for tax calculations and per-tenant metering, plus the
//! `metrics` facade recorder that carries the shared HTTP middleware metrics.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!("tax_db_query_duration_seconds", "Database query duration"),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Recorder handle for the `metrics` facade (HTTP request metrics).
pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Calculations counter (per-tenant metering)
pub static CALCULATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Calculation engine duration
pub static CALCULATION_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Rule operations counter (per-tenant metering)
pub static RULE_OPERATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Rate operations counter (per-tenant metering)
pub static RATE_OPERATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Error counter for alerting
pub static ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Tax collected by currency
pub static TAX_AMOUNT_TOTAL: OnceLock<prometheus::CounterVec> = OnceLock::new();

/// Initialize all metrics. Safe to call more than once.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_none() {
        // A concurrent caller may win the race to install; the loser is ignored.
        if let Ok(handle) = PrometheusBuilder::new().install_recorder() {
            let _ = METRICS_HANDLE.set(handle);
        }
    }

    CALCULATIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "tax_calculations_total",
                "Total tax calculations by tenant, method, mode and outcome"
            ),
            &["tenant_id", "method", "mode", "outcome"]
        )
        .expect("Failed to register CALCULATIONS_TOTAL")
    });

    CALCULATION_DURATION.get_or_init(|| {
        register_histogram_vec!(
            histogram_opts!(
                "tax_calculation_duration_seconds",
                "Tax engine evaluation duration",
                vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]
            ),
            &["mode"]
        )
        .expect("Failed to register CALCULATION_DURATION")
    });

    RULE_OPERATIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "tax_rule_operations_total",
                "Total tax rule operations by tenant and operation type"
            ),
            &["tenant_id", "operation"]
        )
        .expect("Failed to register RULE_OPERATIONS_TOTAL")
    });

    RATE_OPERATIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "tax_rate_operations_total",
                "Total tax rate operations by tenant and operation type"
            ),
            &["tenant_id", "operation"]
        )
        .expect("Failed to register RATE_OPERATIONS_TOTAL")
    });

    ERRORS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("tax_errors_total", "Total errors by type for alerting"),
            &["error_type", "operation"]
        )
        .expect("Failed to register ERRORS_TOTAL")
    });

    TAX_AMOUNT_TOTAL.get_or_init(|| {
        prometheus::register_counter_vec!(
            prometheus::opts!(
                "tax_amount_total",
                "Total tax amount committed by tenant and currency"
            ),
            &["tenant_id", "currency"]
        )
        .expect("Failed to register TAX_AMOUNT_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default();

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode prometheus metrics");
    }
    match String::from_utf8(buffer) {
        Ok(custom_metrics) => output.push_str(&custom_metrics),
        Err(e) => tracing::warn!(error = %e, "Prometheus metrics were not valid UTF-8"),
    }

    output
}

/// Record a calculation outcome.
pub fn record_calculation(tenant_id: &str, method: &str, mode: &str, outcome: &str) {
    if let Some(counter) = CALCULATIONS_TOTAL.get() {
        counter
            .with_label_values(&[tenant_id, method, mode, outcome])
            .inc();
    }
}

/// Record engine evaluation duration.
pub fn record_calculation_duration(mode: &str, duration_secs: f64) {
    if let Some(histogram) = CALCULATION_DURATION.get() {
        histogram.with_label_values(&[mode]).observe(duration_secs);
    }
}

/// Record a rule operation.
pub fn record_rule_operation(tenant_id: &str, operation: &str) {
    if let Some(counter) = RULE_OPERATIONS_TOTAL.get() {
        counter.with_label_values(&[tenant_id, operation]).inc();
    }
}

/// Record a rate operation.
pub fn record_rate_operation(tenant_id: &str, operation: &str) {
    if let Some(counter) = RATE_OPERATIONS_TOTAL.get() {
        counter.with_label_values(&[tenant_id, operation]).inc();
    }
}

/// Record an error for alerting.
pub fn record_error(error_type: &str, operation: &str) {
    if let Some(counter) = ERRORS_TOTAL.get() {
        counter.with_label_values(&[error_type, operation]).inc();
    }
}

/// Record committed tax for financial tracking.
pub fn record_tax_amount(tenant_id: &str, currency: &str, amount: f64) {
    if let Some(counter) = TAX_AMOUNT_TOTAL.get() {
        counter
            .with_label_values(&[tenant_id, currency])
            .inc_by(amount.abs());
    }
}
