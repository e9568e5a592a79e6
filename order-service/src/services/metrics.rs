//! Prometheus metrics for order-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    HistogramVec, TextEncoder,
};

/// Bus request counter by subject and outcome.
pub static BUS_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "orders_bus_requests_total",
        "Total number of bus requests handled or sent",
        &["subject", "status"]
    )
    .expect("Failed to register bus_requests_total")
});

/// Bus request duration histogram by subject.
pub static BUS_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "orders_bus_request_duration_seconds",
        "Bus request duration in seconds",
        &["subject"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register bus_request_duration")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "orders_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Order counter by status written.
pub static ORDERS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "orders_orders_total",
        "Total number of order writes by status",
        &["status"]
    )
    .expect("Failed to register orders_total")
});

/// Receipts attached on payment reconciliation.
pub static RECEIPTS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "orders_receipts_total",
        "Total number of receipts attached to orders"
    )
    .expect("Failed to register receipts_total")
});

/// Times the caller-supplied price was used because the catalog omitted a
/// product. This is the trust-boundary signal; it should stay near zero.
pub static PRICE_FALLBACKS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "orders_price_fallbacks_total",
        "Total number of line items priced from the caller-supplied price"
    )
    .expect("Failed to register price_fallbacks_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "orders_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&BUS_REQUESTS_TOTAL);
    Lazy::force(&BUS_REQUEST_DURATION);
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&ORDERS_TOTAL);
    Lazy::force(&RECEIPTS_TOTAL);
    Lazy::force(&PRICE_FALLBACKS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
