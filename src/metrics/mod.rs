//! Prometheus metrics for the relay core:
//! - Gateway metrics (active connections, opened/closed)
//! - Fan-out metrics (relayed events, send failures)
//! - Orchestrator metrics (round events, launches, in-flight rounds)

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_gauge, Encoder, IntCounter, IntGauge, TextEncoder,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "fedrelay";

lazy_static! {
    // ============================================================================
    // Gateway metrics
    // ============================================================================

    /// Number of currently open WebSocket connections
    pub static ref CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_active", METRIC_PREFIX),
        "Number of currently open WebSocket connections"
    ).unwrap();

    /// Total WebSocket connections accepted
    pub static ref CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections accepted"
    ).unwrap();

    /// Total WebSocket connections closed
    pub static ref CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed"
    ).unwrap();

    // ============================================================================
    // Fan-out metrics
    // ============================================================================

    /// Session events relayed to clients
    pub static ref SESSION_EVENTS_RELAYED: IntCounter = register_int_counter!(
        format!("{}_session_events_relayed_total", METRIC_PREFIX),
        "Session events broadcast to connected clients"
    ).unwrap();

    /// Connections dropped because a relay send failed
    pub static ref RELAY_SEND_FAILURES: IntCounter = register_int_counter!(
        format!("{}_relay_send_failures_total", METRIC_PREFIX),
        "Connections removed after a failed broadcast send"
    ).unwrap();

    // ============================================================================
    // Orchestrator metrics
    // ============================================================================

    /// Round events received from the bus
    pub static ref ROUND_EVENTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_round_events_total", METRIC_PREFIX),
        "Round events received from the event bus"
    ).unwrap();

    /// Round events that failed before launch
    pub static ref ROUND_EVENTS_FAILED: IntCounter = register_int_counter!(
        format!("{}_round_events_failed_total", METRIC_PREFIX),
        "Round events that failed decoding or orchestration"
    ).unwrap();

    /// Data preparation runs
    pub static ref DATA_PREPARATIONS: IntCounter = register_int_counter!(
        format!("{}_data_preparations_total", METRIC_PREFIX),
        "One-time data preparation runs (round 1)"
    ).unwrap();

    /// Training rounds launched
    pub static ref ROUNDS_LAUNCHED: IntCounter = register_int_counter!(
        format!("{}_rounds_launched_total", METRIC_PREFIX),
        "Training-round executions handed to the launch pool"
    ).unwrap();

    /// Training rounds currently in flight
    pub static ref ROUNDS_IN_FLIGHT: IntGauge = register_int_gauge!(
        format!("{}_rounds_in_flight", METRIC_PREFIX),
        "Training-round executions currently running"
    ).unwrap();
}

/// Encode all registered metrics in Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metrics() {
        CONNECTIONS_OPENED.inc();
        let text = encode_metrics().unwrap();
        assert!(text.contains("fedrelay_connections_opened_total"));
    }
}
