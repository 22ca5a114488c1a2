//! Repository for the `jobs` table.

use sqlx::PgPool;

use curator_core::job::{Job, METADATA_WORKFLOW_EXECUTION_ID};
use curator_core::job_state::JobTransition;
use curator_core::status::{JobStatus, StatusId};
use curator_core::types::DbId;

use super::PgTransaction;
use crate::models::job::{CreateJob, JobListQuery, JobRow};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, user_id, workflow_name, status_id, resource_id, metadata, \
    error_message, started_at, completed_at, created_at, updated_at";

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
const DEFAULT_LIMIT: i64 = 50;

/// Terminal statuses: completed, failed, cancelled.
const TERMINAL_STATUSES: [StatusId; 3] = [
    JobStatus::Completed as StatusId,
    JobStatus::Failed as StatusId,
    JobStatus::Cancelled as StatusId,
];

/// Provides persistence operations for jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new pending job.
    pub async fn create(pool: &PgPool, input: &CreateJob) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (user_id, workflow_name, status_id, resource_id, metadata) \
             VALUES ($1, $2, $3, $4, COALESCE($5, '{{}}'::jsonb)) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(input.user_id)
            .bind(&input.workflow_name)
            .bind(JobStatus::Pending.id())
            .bind(input.resource_id)
            .bind(&input.metadata)
            .fetch_one(pool)
            .await?
            .try_into()
    }

    /// Delete a job and, by cascade, its steps. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .map(Job::try_from)
            .transpose()
    }

    /// Find the most recent job recorded with the given engine execution id.
    pub async fn find_by_execution_id(
        pool: &PgPool,
        execution_id: &str,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE metadata->>'{METADATA_WORKFLOW_EXECUTION_ID}' = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(execution_id)
            .fetch_optional(pool)
            .await?
            .map(Job::try_from)
            .transpose()
    }

    /// List jobs, newest first. When `user_id` is `Some`, only that user's
    /// jobs are returned.
    pub async fn list(
        pool: &PgPool,
        user_id: Option<DbId>,
        params: &JobListQuery,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

        // Build the WHERE clause and track the next bind parameter index.
        let mut conditions: Vec<String> = Vec::new();
        let mut bind_idx: u32 = 1;

        if user_id.is_some() {
            conditions.push(format!("user_id = ${bind_idx}"));
            bind_idx += 1;
        }

        if params.status.is_some() {
            conditions.push(format!("status_id = ${bind_idx}"));
            bind_idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             {where_clause} \
             ORDER BY created_at DESC, id DESC \
             LIMIT ${bind_idx}"
        );

        let mut q = sqlx::query_as::<_, JobRow>(&query);

        if let Some(uid) = user_id {
            q = q.bind(uid);
        }
        if let Some(status) = params.status {
            q = q.bind(status.id());
        }

        q = q.bind(limit);

        q.fetch_all(pool)
            .await?
            .into_iter()
            .map(Job::try_from)
            .collect()
    }

    /// Cancel a job if it is not already in a terminal state.
    ///
    /// Returns the updated job, or `None` if it was already completed,
    /// failed or cancelled.
    pub async fn cancel(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status_id = $2, completed_at = NOW() \
             WHERE id = $1 AND status_id NOT IN ($3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .bind(JobStatus::Cancelled.id())
            .bind(TERMINAL_STATUSES[0])
            .bind(TERMINAL_STATUSES[1])
            .bind(TERMINAL_STATUSES[2])
            .fetch_optional(pool)
            .await?
            .map(Job::try_from)
            .transpose()
    }

    // -----------------------------------------------------------------------
    // Transactional helpers
    // -----------------------------------------------------------------------

    /// Load a job and lock its row until the transaction ends.
    pub async fn lock_by_id_tx(
        tx: &mut PgTransaction<'_>,
        id: DbId,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .map(Job::try_from)
            .transpose()
    }

    /// Persist an aggregate status transition computed by `plan_job_transition`.
    pub async fn apply_transition_tx(
        tx: &mut PgTransaction<'_>,
        id: DbId,
        transition: &JobTransition,
    ) -> Result<Job, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status_id = $2, started_at = $3, completed_at = $4, \
                 error_message = COALESCE($5, error_message) \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .bind(transition.status.id())
            .bind(transition.started_at)
            .bind(transition.completed_at)
            .bind(transition.error_message.as_deref())
            .fetch_one(&mut **tx)
            .await?
            .try_into()
    }
}
