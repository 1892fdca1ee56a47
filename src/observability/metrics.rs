//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gate_rate_limited_total` (counter): requests rejected, by profile
//! - `gate_authorization_denied_total` (counter): denials, by reason
//! - `gate_csrf_tokens_issued_total` (counter): tokens handed out
//! - `gate_csrf_validations_total` (counter): checks, by outcome
//! - `gate_swept_records_total` (counter): records purged, by store
//!
//! Recording is a no-op until a recorder is installed, so tests and the
//! CLI pay nothing.

use std::net::SocketAddr;

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_rate_limited(profile: &str) {
    counter!("gate_rate_limited_total", "profile" => profile.to_string()).increment(1);
}

pub fn record_authorization_denied(reason: &'static str) {
    counter!("gate_authorization_denied_total", "reason" => reason).increment(1);
}

pub fn record_csrf_issued() {
    counter!("gate_csrf_tokens_issued_total").increment(1);
}

/// `outcome` is one of `valid`, `missing`, `expired`, `mismatch`, `absent`.
pub fn record_csrf_validation(outcome: &'static str) {
    counter!("gate_csrf_validations_total", "outcome" => outcome).increment(1);
}

pub fn record_swept(store: &'static str, count: usize) {
    counter!("gate_swept_records_total", "store" => store).increment(count as u64);
}
