use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Extension, Json,
};
use common::storage::types::user::User;
use serde::Deserialize;

use crate::{api_state::ApiState, error::ApiError, routes::resolve_job_id};

#[derive(Debug, Deserialize)]
pub struct ProgressParams {
    pub job_id: Option<String>,
}

/// Lightweight polling endpoint: statuses and counters, no content.
pub async fn job_progress(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Query(params): Query<ProgressParams>,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = resolve_job_id(&state, &user, params.job_id).await?;
    let view = state.reporter.get_progress(&job_id).await?;

    Ok(Json(view))
}
