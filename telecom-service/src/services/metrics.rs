//! Metrics module for telecom-service.
//! Provides Prometheus metrics for inventory, provisioning, metering and renewals.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "telecom_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Inventory operations counter
pub static NUMBER_OPERATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Order provisioning counter
pub static PROVISIONING_RUNS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Usage reports counter
pub static USAGE_REPORTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Threshold alerts counter
pub static USAGE_ALERTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Renewal attempts counter
pub static RENEWALS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Subscription lifecycle operations counter
pub static SUBSCRIPTION_OPERATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Error counter for alerting
pub static ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    NUMBER_OPERATIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "telecom_number_operations_total",
                "Total inventory operations by operation and outcome"
            ),
            &["operation", "outcome"]
        )
        .expect("Failed to register NUMBER_OPERATIONS_TOTAL")
    });

    PROVISIONING_RUNS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "telecom_provisioning_runs_total",
                "Total order provisioning runs by outcome"
            ),
            &["outcome"]
        )
        .expect("Failed to register PROVISIONING_RUNS_TOTAL")
    });

    USAGE_REPORTS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("telecom_usage_reports_total", "Total usage reports by outcome"),
            &["outcome"]
        )
        .expect("Failed to register USAGE_REPORTS_TOTAL")
    });

    USAGE_ALERTS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "telecom_usage_alerts_total",
                "Total quota threshold alerts emitted"
            ),
            &["threshold"]
        )
        .expect("Failed to register USAGE_ALERTS_TOTAL")
    });

    RENEWALS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "telecom_renewals_total",
                "Total renewal attempts by plan type and outcome"
            ),
            &["plan_type", "outcome"]
        )
        .expect("Failed to register RENEWALS_TOTAL")
    });

    SUBSCRIPTION_OPERATIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "telecom_subscription_operations_total",
                "Total subscription lifecycle operations"
            ),
            &["operation"]
        )
        .expect("Failed to register SUBSCRIPTION_OPERATIONS_TOTAL")
    });

    ERRORS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("telecom_errors_total", "Total errors by type for alerting"),
            &["error_type", "operation"]
        )
        .expect("Failed to register ERRORS_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_number_operation(operation: &str, outcome: &str) {
    if let Some(counter) = NUMBER_OPERATIONS_TOTAL.get() {
        counter.with_label_values(&[operation, outcome]).inc();
    }
}

pub fn record_provisioning_run(outcome: &str) {
    if let Some(counter) = PROVISIONING_RUNS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

pub fn record_usage_report(outcome: &str) {
    if let Some(counter) = USAGE_REPORTS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

pub fn record_usage_alert(threshold: &str) {
    if let Some(counter) = USAGE_ALERTS_TOTAL.get() {
        counter.with_label_values(&[threshold]).inc();
    }
}

pub fn record_renewal(plan_type: &str, outcome: &str) {
    if let Some(counter) = RENEWALS_TOTAL.get() {
        counter.with_label_values(&[plan_type, outcome]).inc();
    }
}

pub fn record_subscription_operation(operation: &str) {
    if let Some(counter) = SUBSCRIPTION_OPERATIONS_TOTAL.get() {
        counter.with_label_values(&[operation]).inc();
    }
}

/// Record an error for alerting.
pub fn record_error(error_type: &str, operation: &str) {
    if let Some(counter) = ERRORS_TOTAL.get() {
        counter.with_label_values(&[error_type, operation]).inc();
    }
}
