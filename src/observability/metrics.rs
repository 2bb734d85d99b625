//! Metrics collection and exposition.
//!
//! # Metrics
//! - `balancer_backend_healthy` (gauge): 1=healthy, 0=unhealthy
//! - `balancer_backend_latency` (gauge): smoothed latency sample average
//! - `balancer_backend_failure_rate` (gauge): smoothed failure rate
//! - `balancer_backend_in_flight` (gauge): requests currently running
//! - `balancer_requests_total` (counter): completed requests by outcome
//! - `balancer_health_probe_failures_total` (counter): failed health probes

use std::net::SocketAddr;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use crate::load_balancer::stats::StatsSnapshot;

/// Initialize the Prometheus exporter.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus metrics exporter started");
    Ok(())
}

/// Record the state of a backend after a monitor tick.
pub fn record_backend_stats(backend: &str, stats: &StatsSnapshot, in_flight: usize) {
    let label = backend.to_string();
    gauge!("balancer_backend_healthy", "backend" => label.clone())
        .set(if stats.healthy { 1.0 } else { 0.0 });
    gauge!("balancer_backend_latency", "backend" => label.clone()).set(stats.latency);
    gauge!("balancer_backend_failure_rate", "backend" => label.clone()).set(stats.failure_rate);
    gauge!("balancer_backend_in_flight", "backend" => label).set(in_flight as f64);
}

/// Record requests drained from a backend's collector.
pub fn record_requests(backend: &str, requests: u64, errors: u64) {
    if requests == 0 {
        return;
    }
    counter!("balancer_requests_total", "backend" => backend.to_string(), "outcome" => "success")
        .increment(requests - errors);
    if errors > 0 {
        counter!("balancer_requests_total", "backend" => backend.to_string(), "outcome" => "error")
            .increment(errors);
    }
}

/// Record a failed health probe.
pub fn record_probe_failure(backend: &str) {
    counter!("balancer_health_probe_failures_total", "backend" => backend.to_string())
        .increment(1);
}
