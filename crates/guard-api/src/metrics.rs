//! Prometheus metrics for the request guard
//!
//! This module is only compiled when the `metrics` feature is enabled.
//!
//! - `request_guard_rate_limit_decisions_total` - Admission decisions by scope and outcome
//! - `request_guard_replay_lookups_total` - Replay cache lookups by scope and result
//! - `request_guard_replay_stores_total` - Replay entries written by scope and payload kind
//!
//! ## Cardinality Warning
//!
//! Scope labels are caller-chosen. Keep scopes to a fixed set of operation
//! names (`api:quiz:submit`), never per-user or per-key strings.

use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec, Encoder, TextEncoder};

lazy_static! {
    /// Counter for admission decisions by scope and outcome ("allowed" or "limited")
    pub static ref RATE_LIMIT_DECISIONS_TOTAL: CounterVec = register_counter_vec!(
        "request_guard_rate_limit_decisions_total",
        "Rate limit admission decisions",
        &["scope", "outcome"]
    )
    .unwrap();

    /// Counter for replay lookups by scope and result ("hit" or "miss")
    pub static ref REPLAY_LOOKUPS_TOTAL: CounterVec = register_counter_vec!(
        "request_guard_replay_lookups_total",
        "Replay cache lookups",
        &["scope", "result"]
    )
    .unwrap();

    /// Counter for replay entries stored by scope and kind
    pub static ref REPLAY_STORES_TOTAL: CounterVec = register_counter_vec!(
        "request_guard_replay_stores_total",
        "Replay cache writes",
        &["scope", "kind"]
    )
    .unwrap();
}

pub fn record_rate_limit_decision(scope: &str, allowed: bool) {
    let outcome = if allowed { "allowed" } else { "limited" };
    RATE_LIMIT_DECISIONS_TOTAL
        .with_label_values(&[scope, outcome])
        .inc();
}

pub fn record_replay_lookup(scope: &str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    REPLAY_LOOKUPS_TOTAL.with_label_values(&[scope, result]).inc();
}

pub fn record_replay_store(scope: &str, kind: &str) {
    REPLAY_STORES_TOTAL.with_label_values(&[scope, kind]).inc();
}

/// Metrics endpoint handler
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", encoder.format_type().to_string())],
            buffer,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response()
        }
    }
}
