//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, route
//! - `proxy_request_duration_seconds` (histogram): latency by route
//! - `proxy_upload_parts_total` (counter): diverted parts by backend, outcome
//! - `proxy_upload_bytes_total` (counter): diverted bytes by backend
//! - `proxy_send_data_total` (counter): hijacked responses by kind, outcome
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route.to_string()
    )
    .increment(1);
    metrics::histogram!("proxy_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upload_part(backend: &'static str, outcome: &'static str, bytes: u64) {
    metrics::counter!("proxy_upload_parts_total", "backend" => backend, "outcome" => outcome)
        .increment(1);
    if bytes > 0 {
        metrics::counter!("proxy_upload_bytes_total", "backend" => backend).increment(bytes);
    }
}

pub fn record_send_data(kind: &'static str, outcome: &'static str) {
    metrics::counter!("proxy_send_data_total", "kind" => kind, "outcome" => outcome).increment(1);
}
