pub mod health;
pub mod jobs;
pub mod workflow_errors;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                                   realtime change feed (WebSocket)
///
/// /jobs                                 list, create
/// /jobs/{id}                            get
/// /jobs/{id}/steps/{step_name}          update step (PUT)
/// /jobs/{id}/reconcile                  re-derive job status (POST)
/// /jobs/{id}/cancel                     cancel (POST)
///
/// /workflow-errors                      list, report
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/jobs", jobs::router())
        .nest("/workflow-errors", workflow_errors::router())
}
