use axum::routing::get;
use axum::Router;

use crate::handlers::workflow_errors;
use crate::state::AppState;

/// Routes mounted at `/workflow-errors`.
///
/// ```text
/// GET    /    -> list_workflow_errors
/// POST   /    -> report_workflow_error
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/",
        get(workflow_errors::list_workflow_errors).post(workflow_errors::report_workflow_error),
    )
}
