//! Telemetry module for PM33 Connect
//!
//! Prometheus counters for OAuth flows, callbacks and token refreshes.

use crate::{ConnectError, Result};
use once_cell::sync::Lazy;
use prometheus::{CounterVec, Encoder, TextEncoder, register_counter_vec};

/// OAuth flows initiated, by provider and mode (live/simulated)
static FLOWS_INITIATED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pm33_oauth_flows_initiated_total",
        "Total number of OAuth flows initiated",
        &["provider", "mode"]
    )
    .expect("register pm33_oauth_flows_initiated_total")
});

/// OAuth callbacks handled, by provider and outcome (success or error code)
static CALLBACKS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pm33_oauth_callbacks_total",
        "Total number of OAuth callbacks handled",
        &["provider", "outcome"]
    )
    .expect("register pm33_oauth_callbacks_total")
});

/// Token refresh attempts, by provider and outcome
static TOKEN_REFRESH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pm33_token_refresh_total",
        "Total number of access token refresh attempts",
        &["provider", "outcome"]
    )
    .expect("register pm33_token_refresh_total")
});

/// Record an initiated flow
pub fn record_flow_initiated(provider: &str, mode: &str) {
    FLOWS_INITIATED_TOTAL
        .with_label_values(&[provider, mode])
        .inc();
}

/// Record a handled callback
pub fn record_callback(provider: &str, outcome: &str) {
    CALLBACKS_TOTAL.with_label_values(&[provider, outcome]).inc();
}

/// Record a token refresh attempt
pub fn record_token_refresh(provider: &str, outcome: &str) {
    TOKEN_REFRESH_TOTAL
        .with_label_values(&[provider, outcome])
        .inc();
}

/// Get Prometheus metrics in text format
pub fn get_metrics() -> Result<String> {
    // Touch the counters so they appear before the first event
    Lazy::force(&FLOWS_INITIATED_TOTAL);
    Lazy::force(&CALLBACKS_TOTAL);
    Lazy::force(&TOKEN_REFRESH_TOTAL);

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ConnectError::config(format!("Failed to encode metrics: {}", e)))?;

    String::from_utf8(buffer)
        .map_err(|e| ConnectError::config(format!("Failed to convert metrics to UTF-8: {}", e)))
}
