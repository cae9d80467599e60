use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::kernel::ReadinessSnapshot;
use crate::server::app::ApiState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    #[serde(flatten)]
    readiness: ReadinessSnapshot,
}

/// Health check endpoint
///
/// Returns 200 OK once both stores are connected, 503 Service Unavailable
/// while either is still connecting or has failed.
pub async fn health_handler(State(state): State<ApiState>) -> (StatusCode, Json<HealthResponse>) {
    let readiness = state.readiness.snapshot();
    let is_healthy =
        readiness.document_store.is_connected() && readiness.relational_store.is_connected();

    let (status_code, status) = if is_healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            readiness,
        }),
    )
}
