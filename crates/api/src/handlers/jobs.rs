//! Handlers for the `/jobs` resource.
//!
//! Callers are end users (scoped to their own jobs) or the workflow engine
//! service (optionally acting on behalf of a user). A job that does not
//! exist and a job the caller may not see are indistinguishable.

use std::collections::{HashMap, HashSet};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;

use curator_core::error::CoreError;
use curator_core::job::{Job, JobStep, JobWithSteps};
use curator_core::job_state::{plan_job_transition, step_timestamps, StepTimestamps};
use curator_core::realtime::RowChange;
use curator_core::status::StepStatus;
use curator_core::types::DbId;
use curator_db::models::job::{CreateJob, JobListQuery};
use curator_db::models::job_step::{CreateJobStep, StepStatusUpdate};
use curator_db::repositories::{JobRepo, JobStepRepo};

use crate::error::{AppError, AppResult};
use crate::extract::AppJson;
use crate::middleware::auth::Caller;
use crate::response::{DataResponse, StepUpdateResponse};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// Body of `POST /api/v1/jobs`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateJobRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "workflow_name is required"))]
    pub workflow_name: String,
    pub resource_id: Option<DbId>,
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    #[validate(length(min = 1, message = "at least one step is required"), nested)]
    pub steps: Vec<StepDefinition>,
    /// Owner of the job. Service callers only; users always own their jobs.
    pub user_id: Option<DbId>,
}

/// One step in a new job's definition.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct StepDefinition {
    #[serde(default)]
    #[validate(length(min = 1, message = "step_name must not be empty"))]
    pub step_name: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "step_type must not be empty"))]
    pub step_type: String,
    pub step_order: i32,
    pub metadata: Option<serde_json::Value>,
}

/// Body of `PUT /api/v1/jobs/{id}/steps/{step_name}`.
#[derive(Debug, Deserialize)]
pub struct UpdateStepRequest {
    pub status: Option<String>,
    pub error_message: Option<String>,
    pub output_data: Option<serde_json::Value>,
    /// Shallow-merged into the step's existing metadata.
    pub metadata: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fetch a job by ID and verify the caller may access it.
async fn find_and_authorize(pool: &sqlx::PgPool, job_id: DbId, caller: &Caller) -> AppResult<Job> {
    match JobRepo::find_by_id(pool, job_id).await? {
        Some(job) if caller.can_access(job.user_id) => Ok(job),
        _ => Err(AppError::not_found("Job", job_id)),
    }
}

fn validate_step_names(steps: &[StepDefinition]) -> Result<(), CoreError> {
    let mut seen = HashSet::new();
    for step in steps {
        if !seen.insert(step.step_name.as_str()) {
            return Err(CoreError::Validation(format!(
                "Duplicate step_name '{}'",
                step.step_name
            )));
        }
    }
    Ok(())
}

fn require_object(field: &str, value: &Option<serde_json::Value>) -> Result<(), CoreError> {
    match value {
        Some(v) if !v.is_object() => Err(CoreError::Validation(format!(
            "{field} must be a JSON object"
        ))),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Create a pending job with pending steps. If the steps cannot be stored,
/// the job row is deleted again and the request fails with 500.
pub async fn create_job(
    caller: Caller,
    State(state): State<AppState>,
    AppJson(input): AppJson<CreateJobRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    validate_step_names(&input.steps)?;
    require_object("metadata", &input.metadata)?;
    for step in &input.steps {
        require_object("steps.metadata", &step.metadata)?;
    }

    let user_id = caller.owner_for(input.user_id)?.ok_or_else(|| {
        CoreError::Validation("user_id is required for service callers".into())
    })?;

    let job = JobRepo::create(
        &state.pool,
        &CreateJob {
            user_id,
            workflow_name: input.workflow_name.clone(),
            resource_id: input.resource_id,
            metadata: input.metadata.clone(),
        },
    )
    .await?;

    let step_inputs: Vec<CreateJobStep> = input
        .steps
        .iter()
        .map(|s| CreateJobStep {
            step_name: s.step_name.clone(),
            step_type: s.step_type.clone(),
            step_order: s.step_order,
            metadata: s.metadata.clone(),
        })
        .collect();

    let steps = match JobStepRepo::create_for_job(&state.pool, job.id, &step_inputs).await {
        Ok(steps) => steps,
        Err(e) => {
            if let Err(cleanup) = JobRepo::delete(&state.pool, job.id).await {
                tracing::error!(
                    job_id = job.id,
                    error = %cleanup,
                    "Failed to delete job after step insert failure"
                );
            }
            return Err(AppError::InternalError(format!(
                "Failed to create steps for job {}: {e}",
                job.id
            )));
        }
    };

    tracing::info!(
        job_id = job.id,
        user_id,
        workflow_name = %job.workflow_name,
        step_count = steps.len(),
        "Job created",
    );

    state.event_bus.publish(RowChange::job_inserted(job.clone()));
    state.event_bus.publish_all(
        steps
            .iter()
            .cloned()
            .map(|step| RowChange::step_inserted(user_id, step)),
    );

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: JobWithSteps::new(job, steps),
        }),
    ))
}

// ---------------------------------------------------------------------------
// Update step
// ---------------------------------------------------------------------------

/// PUT /api/v1/jobs/{id}/steps/{step_name}
///
/// Update a step's status and re-derive the job's aggregate status in the
/// same transaction. Returns the updated step and the full job.
pub async fn update_step(
    caller: Caller,
    State(state): State<AppState>,
    Path((job_id, step_name)): Path<(DbId, String)>,
    AppJson(input): AppJson<UpdateStepRequest>,
) -> AppResult<impl IntoResponse> {
    let status: StepStatus = input
        .status
        .as_deref()
        .ok_or_else(|| CoreError::Validation("status is required".into()))?
        .parse()?;
    require_object("metadata", &input.metadata)?;

    let now = Utc::now();
    let mut tx = state.pool.begin().await?;

    let job = match JobRepo::lock_by_id_tx(&mut tx, job_id).await? {
        Some(job) if caller.can_access(job.user_id) => job,
        _ => return Err(AppError::not_found("Job", job_id)),
    };
    let step = JobStepRepo::lock_by_name_tx(&mut tx, job_id, &step_name)
        .await?
        .ok_or_else(|| AppError::not_found("Job step", job_id))?;

    let timestamps = step_timestamps(
        status,
        StepTimestamps {
            started_at: step.started_at,
            completed_at: step.completed_at,
        },
        now,
    );
    let updated_step = JobStepRepo::update_status_tx(
        &mut tx,
        step.id,
        &StepStatusUpdate {
            status,
            started_at: timestamps.started_at,
            completed_at: timestamps.completed_at,
            error_message: input.error_message,
            output_data: input.output_data,
            metadata: input.metadata,
        },
    )
    .await?;

    let steps = JobStepRepo::list_by_job_tx(&mut tx, job_id).await?;
    let transition = plan_job_transition(
        job.status,
        job.started_at,
        steps.iter().map(|s| s.status),
        now,
    )
    .map(|t| t.with_step_error(&steps));
    let updated_job = match &transition {
        Some(t) => JobRepo::apply_transition_tx(&mut tx, job_id, t).await?,
        None => job.clone(),
    };

    tx.commit().await?;

    tracing::info!(
        job_id,
        step_name = %step_name,
        step_status = %status,
        job_status = %updated_job.status,
        "Job step updated",
    );

    state.event_bus.publish(RowChange::step_updated(
        job.user_id,
        Some(step),
        updated_step.clone(),
    ));
    if transition.is_some() {
        state
            .event_bus
            .publish(RowChange::job_updated(Some(job), updated_job.clone()));
    }

    Ok(Json(DataResponse {
        data: StepUpdateResponse {
            step: updated_step,
            job: JobWithSteps::new(updated_job, steps),
        },
    }))
}

// ---------------------------------------------------------------------------
// Reconcile
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/reconcile
///
/// Re-run the aggregate status derivation on the job's current steps.
pub async fn reconcile_job(
    caller: Caller,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let now = Utc::now();
    let mut tx = state.pool.begin().await?;

    let job = match JobRepo::lock_by_id_tx(&mut tx, job_id).await? {
        Some(job) if caller.can_access(job.user_id) => job,
        _ => return Err(AppError::not_found("Job", job_id)),
    };
    let steps = JobStepRepo::list_by_job_tx(&mut tx, job_id).await?;

    let transition = plan_job_transition(
        job.status,
        job.started_at,
        steps.iter().map(|s| s.status),
        now,
    )
    .map(|t| t.with_step_error(&steps));
    let updated_job = match &transition {
        Some(t) => JobRepo::apply_transition_tx(&mut tx, job_id, t).await?,
        None => job.clone(),
    };

    tx.commit().await?;

    if transition.is_some() {
        tracing::info!(
            job_id,
            from = %job.status,
            to = %updated_job.status,
            "Job reconciled",
        );
        state
            .event_bus
            .publish(RowChange::job_updated(Some(job), updated_job.clone()));
    }

    Ok(Json(DataResponse {
        data: JobWithSteps::new(updated_job, steps),
    }))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/cancel
///
/// Cancel a pending or running job. Returns 409 if the job is already in a
/// terminal state.
pub async fn cancel_job(
    caller: Caller,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = find_and_authorize(&state.pool, job_id, &caller).await?;

    let cancelled = JobRepo::cancel(&state.pool, job_id).await?.ok_or_else(|| {
        AppError::Core(CoreError::Conflict(
            "Job is already in a terminal state and cannot be cancelled".into(),
        ))
    })?;

    tracing::info!(job_id, user_id = cancelled.user_id, "Job cancelled");
    state
        .event_bus
        .publish(RowChange::job_updated(Some(job), cancelled.clone()));

    let steps = JobStepRepo::list_by_job(&state.pool, job_id).await?;
    Ok(Json(DataResponse {
        data: JobWithSteps::new(cancelled, steps),
    }))
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs
///
/// List the caller's jobs, newest first, each with its steps. Supports
/// optional `status` and `limit` query parameters.
pub async fn list_jobs(
    caller: Caller,
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let jobs = JobRepo::list(&state.pool, caller.scope(), &params).await?;
    let job_ids: Vec<DbId> = jobs.iter().map(|j| j.id).collect();
    let steps = JobStepRepo::list_by_jobs(&state.pool, &job_ids).await?;

    Ok(Json(DataResponse {
        data: group_steps(jobs, steps),
    }))
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    caller: Caller,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = find_and_authorize(&state.pool, job_id, &caller).await?;
    let steps = JobStepRepo::list_by_job(&state.pool, job_id).await?;
    Ok(Json(DataResponse {
        data: JobWithSteps::new(job, steps),
    }))
}

/// Attach steps to their jobs, keeping the job order.
fn group_steps(jobs: Vec<Job>, steps: Vec<JobStep>) -> Vec<JobWithSteps> {
    let mut by_job: HashMap<DbId, Vec<JobStep>> = HashMap::new();
    for step in steps {
        by_job.entry(step.job_id).or_default().push(step);
    }
    jobs.into_iter()
        .map(|job| {
            let steps = by_job.remove(&job.id).unwrap_or_default();
            JobWithSteps::new(job, steps)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(name: &str) -> StepDefinition {
        StepDefinition {
            step_name: name.to_string(),
            step_type: "task".to_string(),
            step_order: 1,
            metadata: None,
        }
    }

    #[test]
    fn rejects_duplicate_step_names() {
        assert!(validate_step_names(&[definition("a"), definition("b")]).is_ok());
        assert!(validate_step_names(&[definition("a"), definition("a")]).is_err());
    }

    #[test]
    fn create_request_requires_steps_and_names() {
        let empty: CreateJobRequest =
            serde_json::from_value(serde_json::json!({ "workflow_name": "ingest" })).unwrap();
        assert!(empty.validate().is_err());

        let blank_step: CreateJobRequest = serde_json::from_value(serde_json::json!({
            "workflow_name": "ingest",
            "steps": [{ "step_name": "", "step_type": "task", "step_order": 1 }]
        }))
        .unwrap();
        assert!(blank_step.validate().is_err());

        let ok: CreateJobRequest = serde_json::from_value(serde_json::json!({
            "workflow_name": "ingest",
            "steps": [{ "step_name": "fetch", "step_type": "task", "step_order": 1 }]
        }))
        .unwrap();
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn metadata_must_be_an_object() {
        assert!(require_object("metadata", &None).is_ok());
        assert!(require_object("metadata", &Some(serde_json::json!({}))).is_ok());
        assert!(require_object("metadata", &Some(serde_json::json!([1]))).is_err());
    }
}
