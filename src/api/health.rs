//! Health check, statistics, and metrics endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::metrics::encode_metrics;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub connections: ConnectionHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct ConnectionHealthResponse {
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub connections: usize,
    pub session_events_relayed: u64,
    pub round_events: u64,
    pub round_events_failed: u64,
    pub rounds_launched: u64,
    pub rounds_in_flight: i64,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        connections: ConnectionHealthResponse {
            total: state.registry.len(),
        },
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    use crate::metrics::{
        ROUNDS_IN_FLIGHT, ROUNDS_LAUNCHED, ROUND_EVENTS_FAILED, ROUND_EVENTS_TOTAL,
        SESSION_EVENTS_RELAYED,
    };

    Json(StatsResponse {
        connections: state.registry.len(),
        session_events_relayed: SESSION_EVENTS_RELAYED.get(),
        round_events: ROUND_EVENTS_TOTAL.get(),
        round_events_failed: ROUND_EVENTS_FAILED.get(),
        rounds_launched: ROUNDS_LAUNCHED.get(),
        rounds_in_flight: ROUNDS_IN_FLIGHT.get(),
    })
}

pub async fn metrics() -> impl IntoResponse {
    match encode_metrics() {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "encoding error").into_response()
        }
    }
}
