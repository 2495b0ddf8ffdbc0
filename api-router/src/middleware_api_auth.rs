use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use common::storage::types::user::User;

use crate::{api_state::ApiState, error::ApiError};

const API_KEY_HEADER: &str = "X-API-Key";

/// Resolves the presented API key to a `User` and stashes it in the request
/// extensions for the job handlers, which scope every lookup to that caller.
pub async fn api_auth(
    State(state): State<ApiState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let api_key = presented_key(&request)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Missing API key".to_string()))?;

    let user = User::find_by_api_key(&api_key, &state.db)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Unrecognized API key".to_string()))?;

    debug!(user_id = %user.id, admin = user.admin, "authenticated generation API caller");
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// `X-API-Key` wins over an `Authorization: Bearer` token when both appear.
fn presented_key(request: &Request) -> Option<String> {
    let headers = request.headers();
    if let Some(key) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(key.trim().to_string());
    }
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
}
