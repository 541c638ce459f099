//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_kernels_active` (gauge): live kernels
//! - `gateway_launch_rejected_total` (counter): launches refused, by reason
//! - `gateway_sessions_recovered_total` (counter): reattach outcomes at startup
//! - `gateway_kernels_culled_total` (counter): idle kernels reclaimed
//!
//! Recording is a no-op until a recorder is installed.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn set_active_kernels(count: usize) {
    metrics::gauge!("gateway_kernels_active").set(count as f64);
}

pub fn record_launch_rejected(reason: &'static str) {
    metrics::counter!("gateway_launch_rejected_total", "reason" => reason).increment(1);
}

pub fn record_recovery(outcome: &'static str) {
    metrics::counter!("gateway_sessions_recovered_total", "outcome" => outcome).increment(1);
}

pub fn record_culled(count: usize) {
    metrics::counter!("gateway_kernels_culled_total").increment(count as u64);
}
