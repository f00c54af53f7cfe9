//! Health and metrics endpoints

use axum::{extract::State, http::StatusCode, Json};
use relay_core::ConnectionStore;
use serde::Serialize;

use crate::metrics;
use crate::server::GatewayState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub instance_id: String,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub store: bool,
    pub local_connections: usize,
}

/// GET /health
pub async fn health_check(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        instance_id: state.instance_id().to_string(),
    })
}

/// GET /health/ready
pub async fn readiness_check(
    State(state): State<GatewayState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let store = match state.registry().store().ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness probe: connection store unreachable");
            false
        }
    };

    let status = if store {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = ReadinessResponse {
        status: if store { "ready" } else { "degraded" },
        store,
        local_connections: state.connections().len(),
    };
    (status, Json(body))
}

/// GET /metrics
pub async fn metrics_handler() -> String {
    metrics::render_metrics()
}
