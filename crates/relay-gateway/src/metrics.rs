//! Gateway metrics
//!
//! Counters and histograms recorded through the `metrics` facade and
//! exported in Prometheus text format on `/metrics`. Recording is a no-op
//! until a recorder is installed.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub const CONNECTIONS_ACTIVE: &str = "relay_gateway_connections_active";
pub const CONNECTIONS_TOTAL: &str = "relay_gateway_connections_total";
pub const AUTH_FAILURES_TOTAL: &str = "relay_gateway_auth_failures_total";
pub const MESSAGES_IN_TOTAL: &str = "relay_gateway_messages_in_total";
pub const MESSAGES_OUT_TOTAL: &str = "relay_gateway_messages_out_total";
pub const MESSAGES_DROPPED_TOTAL: &str = "relay_gateway_messages_dropped_total";
pub const ERRORS_TOTAL: &str = "relay_gateway_errors_total";
pub const HEARTBEAT_EVICTIONS_TOTAL: &str = "relay_gateway_heartbeat_evictions_total";
pub const DISPATCH_LATENCY_SECONDS: &str = "relay_gateway_dispatch_latency_seconds";
pub const FANOUT_LATENCY_SECONDS: &str = "relay_gateway_fanout_latency_seconds";

/// Errors that can occur during metrics initialization
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Metrics recorder already installed")]
    AlreadyInitialized,

    #[error("Failed to install metrics recorder: {0}")]
    InitializationFailed(String),
}

/// Install the Prometheus recorder for this process
pub fn init_metrics() -> Result<(), MetricsError> {
    if METRICS_HANDLE.get().is_some() {
        return Err(MetricsError::AlreadyInitialized);
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MetricsError::InitializationFailed(e.to_string()))?;

    METRICS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::AlreadyInitialized)?;

    describe();
    Ok(())
}

/// Prometheus text exposition, empty when no recorder is installed
#[must_use]
pub fn render_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

fn describe() {
    describe_gauge!(CONNECTIONS_ACTIVE, "Connections currently held by this instance");
    describe_counter!(CONNECTIONS_TOTAL, "Connections accepted since start");
    describe_counter!(AUTH_FAILURES_TOTAL, "Connection attempts rejected at authentication");
    describe_counter!(MESSAGES_IN_TOTAL, "Envelopes received from clients");
    describe_counter!(MESSAGES_OUT_TOTAL, "Frames written to client sockets");
    describe_counter!(
        MESSAGES_DROPPED_TOTAL,
        "Outbound messages dropped by backpressure"
    );
    describe_counter!(ERRORS_TOTAL, "Connection-level errors by kind");
    describe_counter!(
        HEARTBEAT_EVICTIONS_TOTAL,
        "Connections closed after missing heartbeats"
    );
    describe_histogram!(
        DISPATCH_LATENCY_SECONDS,
        "Time from envelope receipt to service dispatch"
    );
    describe_histogram!(
        FANOUT_LATENCY_SECONDS,
        "Time to enqueue one broadcast for local subscribers"
    );
}

pub fn connection_opened() {
    counter!(CONNECTIONS_TOTAL).increment(1);
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

pub fn connection_closed() {
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

pub fn auth_failure() {
    counter!(AUTH_FAILURES_TOTAL).increment(1);
}

pub fn message_in(channel: &str) {
    counter!(MESSAGES_IN_TOTAL, "channel" => channel.to_string()).increment(1);
}

pub fn message_out() {
    counter!(MESSAGES_OUT_TOTAL).increment(1);
}

pub fn message_dropped(channel: &str, reason: &'static str) {
    counter!(
        MESSAGES_DROPPED_TOTAL,
        "channel" => channel.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn error(kind: &'static str) {
    counter!(ERRORS_TOTAL, "kind" => kind).increment(1);
}

pub fn heartbeat_eviction() {
    counter!(HEARTBEAT_EVICTIONS_TOTAL).increment(1);
}

pub fn dispatch_latency(channel: &str, elapsed: Duration) {
    histogram!(DISPATCH_LATENCY_SECONDS, "channel" => channel.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn fanout_latency(channel: &str, elapsed: Duration) {
    histogram!(FANOUT_LATENCY_SECONDS, "channel" => channel.to_string())
        .record(elapsed.as_secs_f64());
}
