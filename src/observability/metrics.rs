//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): finalized requests by method, status, outcome
//! - `proxy_request_duration_seconds` (histogram): time from arrival to finalize, by outcome
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until an
//!   exporter is installed
//! - The Prometheus exporter only runs when a scrape address is configured

use axum::http::Method;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Instant;

use crate::http::completion::Outcome;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record one finalized request.
pub fn record_request(method: &Method, status: u16, outcome: Outcome, started: Instant) {
    let labels = [
        ("method", method.as_str().to_string()),
        ("status", status.to_string()),
        ("outcome", outcome.as_str().to_string()),
    ];
    ::metrics::counter!("proxy_requests_total", &labels).increment(1);
    ::metrics::histogram!("proxy_request_duration_seconds", "outcome" => outcome.as_str())
        .record(started.elapsed().as_secs_f64());
}
