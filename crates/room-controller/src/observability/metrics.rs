//! Metrics definitions for the Room Controller.
//!
//! All metrics follow Prometheus naming conventions:
//! - `rc_` prefix for Room Controller
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: media node RPC methods issued by this crate (~10 values)
//! - `status`: success, error, timeout, closed
//! - `outcome`: handled, unhandled, rejected
//! - `strategy`: sticky, geo, least_loaded

use crate::errors::RcError;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used to render
/// `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Media node RPC latency buckets - internal service call
        .set_buckets_for_metric(
            Matcher::Prefix("rc_rpc".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 3.000,
            ],
        )
        .map_err(|e| format!("Failed to set RPC latency buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

/// Status label for a finished media node request.
#[must_use]
pub fn rpc_status<T>(result: &Result<T, RcError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(RcError::Timeout { .. }) => "timeout",
        Err(RcError::ConnectionClosed) => "closed",
        Err(_) => "error",
    }
}

// ============================================================================
// Media node RPC
// ============================================================================

/// Record a completed media node request.
///
/// Metrics: `rc_rpc_requests_total`, `rc_rpc_request_duration_seconds`
/// Labels: `method`, `status`
pub fn record_rpc_request(method: &str, status: &str, duration: Duration) {
    counter!(
        "rc_rpc_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("rc_rpc_request_duration_seconds", "method" => method.to_string())
        .record(duration.as_secs_f64());
}

/// A media node connection became ready.
///
/// Metric: `rc_media_node_connections_active`
pub fn record_node_connection_opened() {
    gauge!("rc_media_node_connections_active").increment(1.0);
}

/// A ready media node connection closed.
pub fn record_node_connection_closed() {
    gauge!("rc_media_node_connections_active").decrement(1.0);
}

/// Set the number of registered media nodes.
///
/// Metric: `rc_media_nodes_registered`
pub fn set_media_nodes_registered(count: usize) {
    // usize to f64 conversion is safe for realistic cluster sizes (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("rc_media_nodes_registered").set(count as f64);
}

// ============================================================================
// Pipe transports
// ============================================================================

/// Metric: `rc_pipe_transports_active`
pub fn record_pipe_transport_opened() {
    gauge!("rc_pipe_transports_active").increment(1.0);
}

pub fn record_pipe_transport_closed() {
    gauge!("rc_pipe_transports_active").decrement(1.0);
}

// ============================================================================
// Rooms
// ============================================================================

/// Record a peer message outcome.
///
/// Metric: `rc_peer_messages_total`
/// Labels: `outcome` (handled, unhandled, rejected)
pub fn record_peer_message(outcome: &'static str) {
    counter!("rc_peer_messages_total", "outcome" => outcome).increment(1);
}

/// Record which strategy placed a room on a media node.
///
/// Metric: `rc_room_placements_total`
/// Labels: `strategy`
pub fn record_room_placement(strategy: &'static str) {
    counter!("rc_room_placements_total", "strategy" => strategy).increment(1);
}
