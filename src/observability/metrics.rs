//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): responses by route, status
//! - `gateway_failures_total` (counter): failures by route, category
//! - `gateway_request_duration_seconds` (histogram): latency by route
//! - `gateway_in_flight` (gauge): live forwarding contexts
//! - `gateway_open_connections` (gauge): open client connections

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use thiserror::Error;

use crate::error::FailureCategory;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("invalid metrics address {0:?}")]
    Address(String),

    #[error("failed to install Prometheus exporter: {0}")]
    Install(#[from] BuildError),
}

/// Install the Prometheus exporter with an HTTP scrape listener on `address`.
pub fn init_metrics(address: &str) -> Result<(), MetricsError> {
    let addr: SocketAddr = address
        .parse()
        .map_err(|_| MetricsError::Address(address.to_string()))?;

    PrometheusBuilder::new().with_http_listener(addr).install()?;

    describe_counter!("gateway_requests_total", "Responses relayed to clients");
    describe_counter!("gateway_failures_total", "Forwarding failures by category");
    describe_histogram!(
        "gateway_request_duration_seconds",
        "Time from route match to completion"
    );
    describe_gauge!("gateway_in_flight", "Live forwarding contexts");
    describe_gauge!("gateway_open_connections", "Open client connections");

    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(route: &str, status: u16, duration: Duration) {
    counter!(
        "gateway_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "route" => route.to_string())
        .record(duration.as_secs_f64());
}

pub fn record_failure(route: &str, category: FailureCategory) {
    counter!(
        "gateway_failures_total",
        "route" => route.to_string(),
        "category" => category.as_str()
    )
    .increment(1);
}

pub fn set_in_flight(count: usize) {
    gauge!("gateway_in_flight").set(count as f64);
}

pub fn set_open_connections(count: u64) {
    gauge!("gateway_open_connections").set(count as f64);
}
