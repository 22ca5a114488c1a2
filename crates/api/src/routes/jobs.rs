//! Route definitions for the `/jobs` resource.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// GET    /                        -> list_jobs
/// POST   /                        -> create_job
/// GET    /{id}                    -> get_job
/// PUT    /{id}/steps/{step_name}  -> update_step
/// POST   /{id}/reconcile          -> reconcile_job
/// POST   /{id}/cancel             -> cancel_job
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(jobs::list_jobs).post(jobs::create_job))
        .route("/{id}", get(jobs::get_job))
        .route("/{id}/steps/{step_name}", put(jobs::update_step))
        .route("/{id}/reconcile", post(jobs::reconcile_job))
        .route("/{id}/cancel", post(jobs::cancel_job))
}
