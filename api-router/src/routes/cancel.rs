use axum::{extract::State, response::IntoResponse, Extension, Json};
use common::storage::types::user::User;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError, routes::resolve_job_id};

#[derive(Debug, Default, Deserialize)]
pub struct CancelParams {
    #[serde(default)]
    pub job_id: Option<String>,
}

/// Cooperative cancellation: in-flight items finish, pending items never
/// start. Safe to call repeatedly; replies with the final-known state.
pub async fn cancel_job(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    body: Option<Json<CancelParams>>,
) -> Result<impl IntoResponse, ApiError> {
    let params = body.map(|Json(params)| params).unwrap_or_default();
    let job_id = resolve_job_id(&state, &user, params.job_id).await?;

    let job = state.orchestrator.cancel(&job_id).await?;
    info!(user_id = %user.id, %job_id, status = job.status.as_str(), "Cancellation requested");

    Ok(Json(json!({
        "job_id": job.id,
        "status": job.status,
        "total": job.total,
        "completed": job.completed,
        "succeeded": job.succeeded,
        "failed": job.failed,
    })))
}
