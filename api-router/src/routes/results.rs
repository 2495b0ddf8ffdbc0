use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Extension, Json,
};
use common::storage::types::user::User;
use serde::Deserialize;

use crate::{api_state::ApiState, error::ApiError, routes::resolve_job_id};

#[derive(Debug, Deserialize)]
pub struct ResultsParams {
    pub job_id: Option<String>,
}

/// Full detail with previews and error messages, for the one-shot results
/// screen rather than frequent polling.
pub async fn job_results(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Query(params): Query<ResultsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = resolve_job_id(&state, &user, params.job_id).await?;
    let view = state.reporter.get_results(&job_id).await?;

    Ok(Json(view))
}
