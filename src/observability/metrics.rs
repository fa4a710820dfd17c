//! Metrics collection and exposition.
//!
//! # Metrics
//! - `lb_requests_total` (counter): requests by method, backend, status
//! - `lb_upstream_duration_seconds` (histogram): forward latency per backend
//! - `lb_backend_active_connections` (gauge): reserved slots per backend
//!
//! Without an installed recorder every call is a no-op.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record the outcome of one proxied request.
pub fn record_request(method: &str, status: u16, backend: &str, elapsed: Duration) {
    counter!(
        "lb_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "backend" => backend.to_string()
    )
    .increment(1);
    histogram!("lb_upstream_duration_seconds", "backend" => backend.to_string())
        .record(elapsed.as_secs_f64());
}

/// Track a reserved slot. The gauge moves by deltas so that concurrent
/// updates cannot leave it at a stale absolute value.
pub fn connection_opened(backend: &str) {
    gauge!("lb_backend_active_connections", "backend" => backend.to_string()).increment(1.0);
}

pub fn connection_closed(backend: &str) {
    gauge!("lb_backend_active_connections", "backend" => backend.to_string()).decrement(1.0);
}
