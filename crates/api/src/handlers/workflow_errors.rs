//! Handlers for the `/workflow-errors` resource.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use validator::Validate;

use curator_core::error::CoreError;
use curator_core::realtime::RowChange;
use curator_core::types::DbId;
use curator_db::models::workflow_error::{CreateWorkflowError, WorkflowErrorListQuery};
use curator_db::repositories::{JobRepo, WorkflowErrorRepo};

use crate::error::AppResult;
use crate::extract::AppJson;
use crate::middleware::auth::{AuthUser, Caller};
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `POST /api/v1/workflow-errors`.
#[derive(Debug, Deserialize, Validate)]
pub struct ReportWorkflowErrorRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "workflow_name is required"))]
    pub workflow_name: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "error_message is required"))]
    pub error_message: String,
    pub workflow_execution_id: Option<String>,
    pub error_node: Option<String>,
    pub error_data: Option<serde_json::Value>,
    pub user_id: Option<DbId>,
}

/// POST /api/v1/workflow-errors
///
/// The owner is the explicit `user_id`, the acting user, or the owner of
/// the job recorded with the same `workflow_execution_id`, in that order.
pub async fn report_workflow_error(
    caller: Caller,
    State(state): State<AppState>,
    AppJson(input): AppJson<ReportWorkflowErrorRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;

    let execution_id = input
        .workflow_execution_id
        .filter(|id| !id.trim().is_empty());

    let user_id = match caller.owner_for(input.user_id)? {
        Some(user_id) => user_id,
        None => resolve_owner(&state.pool, execution_id.as_deref())
            .await?
            .ok_or_else(|| {
                CoreError::Validation(
                    "Could not resolve the owning user; provide user_id or a known \
                     workflow_execution_id"
                        .into(),
                )
            })?,
    };

    let error = WorkflowErrorRepo::create(
        &state.pool,
        &CreateWorkflowError {
            user_id,
            workflow_name: input.workflow_name,
            error_message: input.error_message,
            workflow_execution_id: execution_id,
            error_node: input.error_node,
            error_data: input.error_data,
        },
    )
    .await?;

    tracing::warn!(
        error_id = error.id,
        user_id,
        workflow_name = %error.workflow_name,
        error_node = error.error_node.as_deref().unwrap_or("-"),
        "Workflow error reported",
    );
    state
        .event_bus
        .publish(RowChange::workflow_error_inserted(error.clone()));

    Ok((StatusCode::CREATED, Json(DataResponse { data: error })))
}

async fn resolve_owner(
    pool: &sqlx::PgPool,
    execution_id: Option<&str>,
) -> AppResult<Option<DbId>> {
    let Some(execution_id) = execution_id else {
        return Ok(None);
    };
    let job = JobRepo::find_by_execution_id(pool, execution_id).await?;
    Ok(job.map(|j| j.user_id))
}

/// GET /api/v1/workflow-errors
pub async fn list_workflow_errors(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<WorkflowErrorListQuery>,
) -> AppResult<impl IntoResponse> {
    let errors = WorkflowErrorRepo::list_by_user(&state.pool, auth.user_id, &params).await?;
    Ok(Json(DataResponse { data: errors }))
}
