//! Repository for the `job_steps` table.
//!
//! Steps are addressed by `(job_id, step_name)` when updated, since the
//! workflow engine refers to steps by name.

use sqlx::PgPool;

use curator_core::job::JobStep;
use curator_core::status::StepStatus;
use curator_core::types::DbId;

use super::PgTransaction;
use crate::models::job_step::{CreateJobStep, JobStepRow, StepStatusUpdate};

/// Column list for `job_steps` queries.
const COLUMNS: &str = "\
    id, job_id, step_name, step_type, step_order, status_id, \
    started_at, completed_at, error_message, output_data, metadata, \
    created_at, updated_at";

/// Provides persistence operations for job steps.
pub struct JobStepRepo;

impl JobStepRepo {
    /// Insert all steps of a new job as pending, atomically.
    pub async fn create_for_job(
        pool: &PgPool,
        job_id: DbId,
        steps: &[CreateJobStep],
    ) -> Result<Vec<JobStep>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "INSERT INTO job_steps (job_id, step_name, step_type, step_order, status_id, metadata) \
             VALUES ($1, $2, $3, $4, $5, COALESCE($6, '{{}}'::jsonb)) \
             RETURNING {COLUMNS}"
        );

        let mut created = Vec::with_capacity(steps.len());
        for step in steps {
            let row = sqlx::query_as::<_, JobStepRow>(&query)
                .bind(job_id)
                .bind(&step.step_name)
                .bind(&step.step_type)
                .bind(step.step_order)
                .bind(StepStatus::Pending.id())
                .bind(&step.metadata)
                .fetch_one(&mut *tx)
                .await?;
            created.push(JobStep::try_from(row)?);
        }

        tx.commit().await?;
        Ok(created)
    }

    /// List a job's steps ordered by `step_order`.
    pub async fn list_by_job(pool: &PgPool, job_id: DbId) -> Result<Vec<JobStep>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM job_steps WHERE job_id = $1 ORDER BY step_order, id"
        );
        sqlx::query_as::<_, JobStepRow>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(JobStep::try_from)
            .collect()
    }

    /// List the steps of several jobs in one query.
    pub async fn list_by_jobs(
        pool: &PgPool,
        job_ids: &[DbId],
    ) -> Result<Vec<JobStep>, sqlx::Error> {
        if job_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!(
            "SELECT {COLUMNS} FROM job_steps \
             WHERE job_id = ANY($1) \
             ORDER BY job_id, step_order, id"
        );
        sqlx::query_as::<_, JobStepRow>(&query)
            .bind(job_ids)
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(JobStep::try_from)
            .collect()
    }

    // -----------------------------------------------------------------------
    // Transactional helpers
    // -----------------------------------------------------------------------

    /// List a job's steps inside an open transaction.
    pub async fn list_by_job_tx(
        tx: &mut PgTransaction<'_>,
        job_id: DbId,
    ) -> Result<Vec<JobStep>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM job_steps WHERE job_id = $1 ORDER BY step_order, id"
        );
        sqlx::query_as::<_, JobStepRow>(&query)
            .bind(job_id)
            .fetch_all(&mut **tx)
            .await?
            .into_iter()
            .map(JobStep::try_from)
            .collect()
    }

    /// Load a step by name and lock its row until the transaction ends.
    pub async fn lock_by_name_tx(
        tx: &mut PgTransaction<'_>,
        job_id: DbId,
        step_name: &str,
    ) -> Result<Option<JobStep>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM job_steps \
             WHERE job_id = $1 AND step_name = $2 \
             FOR UPDATE"
        );
        sqlx::query_as::<_, JobStepRow>(&query)
            .bind(job_id)
            .bind(step_name)
            .fetch_optional(&mut **tx)
            .await?
            .map(JobStep::try_from)
            .transpose()
    }

    /// Apply a status update to a step.
    ///
    /// `error_message` and `output_data` replace the stored values only when
    /// provided; `metadata` is shallow-merged into the stored object.
    pub async fn update_status_tx(
        tx: &mut PgTransaction<'_>,
        step_id: DbId,
        update: &StepStatusUpdate,
    ) -> Result<JobStep, sqlx::Error> {
        let query = format!(
            "UPDATE job_steps \
             SET status_id = $2, \
                 started_at = $3, \
                 completed_at = $4, \
                 error_message = COALESCE($5, error_message), \
                 output_data = COALESCE($6, output_data), \
                 metadata = metadata || COALESCE($7, '{{}}'::jsonb) \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobStepRow>(&query)
            .bind(step_id)
            .bind(update.status.id())
            .bind(update.started_at)
            .bind(update.completed_at)
            .bind(&update.error_message)
            .bind(&update.output_data)
            .bind(&update.metadata)
            .fetch_one(&mut **tx)
            .await?
            .try_into()
    }
}
