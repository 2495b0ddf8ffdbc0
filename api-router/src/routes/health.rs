use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::warn;

use crate::api_state::ApiState;

/// Process-level probe; answers as long as the router is serving.
pub async fn live() -> impl IntoResponse {
    Json(json!({ "alive": true }))
}

/// Dependency probe: the job store must answer before this instance accepts
/// generation traffic.
pub async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    match state.db.client.query("RETURN true").await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({ "ready": true, "job_store": "ok" })),
        ),
        Err(err) => {
            warn!(error = %err, "readiness check failed against the job store");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "ready": false, "job_store": "unreachable" })),
            )
        }
    }
}
