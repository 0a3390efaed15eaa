//! Prometheus metrics for commerce-service.

use std::sync::{Once, OnceLock};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static RECORDER: Once = Once::new();

/// Orders by outcome: created, rejected, failed.
pub static ORDERS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "commerce_orders_total",
        "Total number of order settlement attempts",
        &["outcome"]
    )
    .expect("Failed to register orders_total")
});

/// Payments by final status: successful, unsuccessful, rejected.
pub static PAYMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "commerce_payments_total",
        "Total number of payment attempts",
        &["status"]
    )
    .expect("Failed to register payments_total")
});

/// Gateway responses by endpoint and HTTP status.
pub static GATEWAY_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "commerce_gateway_requests_total",
        "Total number of requests sent to the payment gateway",
        &["endpoint", "status"]
    )
    .expect("Failed to register gateway_requests_total")
});

/// Token refreshes by trigger (scheduled, reactive) and outcome.
pub static TOKEN_REFRESH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "commerce_gateway_token_refresh_total",
        "Total number of gateway token refreshes",
        &["trigger", "outcome"]
    )
    .expect("Failed to register token_refresh_total")
});

pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "commerce_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Installs the HTTP metrics recorder and registers service metrics. Safe to call repeatedly.
pub fn init_metrics() {
    RECORDER.call_once(|| match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = METRICS_HANDLE.set(handle);
        }
        Err(e) => tracing::warn!(error = %e, "Prometheus recorder already installed"),
    });

    Lazy::force(&ORDERS_TOTAL);
    Lazy::force(&PAYMENTS_TOTAL);
    Lazy::force(&GATEWAY_REQUESTS_TOTAL);
    Lazy::force(&TOKEN_REFRESH_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default();

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&prometheus::gather(), &mut buffer).is_ok() {
        output.push_str(&String::from_utf8_lossy(&buffer));
    }

    output
}
