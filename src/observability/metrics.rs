//! # Metrics Collection
//!
//! Prometheus metrics for rebuilds, snapshot distribution and discovery streams.
//! Without an installed exporter every call is a no-op.

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use ::tracing::info;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Metrics recorder that tracks control plane activity
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorder;

static METRICS: once_cell::sync::Lazy<MetricsRecorder> = once_cell::sync::Lazy::new(MetricsRecorder::new);

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Record a completed (or failed) fleet rebuild
    pub fn record_rebuild(&self, fleet: &str, success: bool, duration: f64) {
        let status = if success { "success" } else { "error" };
        let labels = [("fleet", fleet.to_string()), ("status", status.to_string())];
        counter!("fleet_rebuilds_total", &labels).increment(1);

        let duration_labels = [("fleet", fleet.to_string())];
        histogram!("fleet_rebuild_duration_seconds", &duration_labels).record(duration);
    }

    /// Record a snapshot becoming active for a fleet
    pub fn record_snapshot_applied(&self, fleet: &str, clusters: usize, routes: usize) {
        let labels = [("fleet", fleet.to_string())];
        counter!("snapshots_applied_total", &labels).increment(1);
        gauge!("snapshot_clusters", &labels).set(clusters as f64);
        gauge!("snapshot_routes", &labels).set(routes as f64);
    }

    /// Record a snapshot push to one node
    pub fn record_node_push(&self, fleet: &str, success: bool) {
        let status = if success { "success" } else { "error" };
        let labels = [("fleet", fleet.to_string()), ("status", status.to_string())];
        counter!("snapshot_pushes_total", &labels).increment(1);
    }

    /// Record an xDS stream connection event
    pub fn record_xds_connection(&self, fleet: &str, connected: bool) {
        let labels = [("fleet", fleet.to_string())];
        if connected {
            gauge!("xds_connections", &labels).increment(1.0);
        } else {
            gauge!("xds_connections", &labels).decrement(1.0);
        }
    }

    /// Record an xDS response outcome
    pub fn record_xds_response(&self, type_url: &str, acked: bool) {
        let status = if acked { "ack" } else { "nack" };
        let labels = [("type_url", type_url.to_string()), ("status", status.to_string())];
        counter!("xds_responses_total", &labels).increment(1);
    }

    fn describe(&self) {
        describe_counter!("fleet_rebuilds_total", "Fleet configuration rebuilds by outcome");
        describe_histogram!(
            "fleet_rebuild_duration_seconds",
            Unit::Seconds,
            "Time spent compiling intent into a snapshot"
        );
        describe_counter!("snapshots_applied_total", "Snapshots activated per fleet");
        describe_gauge!("snapshot_clusters", "Clusters in the active snapshot");
        describe_gauge!("snapshot_routes", "Routes in the active snapshot");
        describe_counter!("snapshot_pushes_total", "Snapshot deliveries to connected nodes");
        describe_gauge!("xds_connections", "Open discovery streams per fleet");
        describe_counter!("xds_responses_total", "Discovery responses by ACK status");
    }
}

/// Global metrics recorder
pub fn recorder() -> &'static MetricsRecorder {
    &METRICS
}

/// Install the Prometheus exporter if metrics are enabled
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    if !config.enable_metrics {
        return Ok(());
    }

    let metrics_addr = format!("0.0.0.0:{}", config.metrics_port);
    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        Error::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", crate::APP_NAME)
        .install()
        .map_err(|e| Error::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    recorder().describe();

    info!(metrics_addr = %metrics_addr, "Metrics collection initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_exporter_is_noop() {
        let metrics = recorder();
        metrics.record_rebuild("default.default", true, 0.01);
        metrics.record_snapshot_applied("default.default", 2, 7);
        metrics.record_node_push("default.default", false);
        metrics.record_xds_connection("default.default", true);
        metrics.record_xds_response("type.googleapis.com/envoy.config.cluster.v3.Cluster", true);
    }

    #[test]
    fn test_disabled_metrics_skip_exporter() {
        let config = ObservabilityConfig { enable_metrics: false, ..Default::default() };
        assert!(init_metrics(&config).is_ok());
    }
}
