use common::{
    error::AppError,
    storage::types::{generation_job::GenerationJob, user::User},
};

use crate::{api_state::ApiState, error::ApiError};

pub mod cancel;
pub mod health;
pub mod progress;
pub mod results;
pub mod start;

/// Resolves which job a boundary call addresses. An explicit id must belong
/// to the caller (admins may address any job); with no id the caller's most
/// recently started still-active job is used.
pub(crate) async fn resolve_job_id(
    state: &ApiState,
    user: &User,
    explicit: Option<String>,
) -> Result<String, ApiError> {
    match explicit {
        Some(job_id) => {
            let job = state
                .db
                .get_item::<GenerationJob>(&job_id)
                .await
                .map_err(AppError::from)
                .map_err(ApiError::from)?
                .ok_or_else(|| ApiError::NotFound(format!("job {job_id}")))?;

            // do not leak other callers' job ids
            if job.owner_id != user.id && !user.admin {
                return Err(ApiError::NotFound(format!("job {job_id}")));
            }

            Ok(job_id)
        }
        None => {
            let job = GenerationJob::find_active_for_owner(&user.id, &state.db)
                .await
                .map_err(ApiError::from)?;
            job.map(|job| job.id).ok_or(ApiError::NoActiveJob)
        }
    }
}
