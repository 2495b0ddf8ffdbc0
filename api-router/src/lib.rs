use api_state::ApiState;
use axum::{
    extract::FromRef,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use middleware_api_auth::api_auth;
use routes::{
    cancel::cancel_job,
    health::{live, ready},
    progress::job_progress,
    results::job_results,
    start::start_job,
};

pub mod api_state;
pub mod error;
mod middleware_api_auth;
mod routes;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Public, unauthenticated endpoints (for k8s/systemd probes)
    let public = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live));

    // Protected API endpoints (require auth)
    let protected = Router::new()
        .route("/jobs", post(start_job))
        .route("/jobs/progress", get(job_progress))
        .route("/jobs/results", get(job_results))
        .route("/jobs/cancel", post(cancel_job))
        .route_layer(from_fn_with_state(app_state.clone(), api_auth));

    public.merge(protected)
}
