//! Repository for the `workflow_errors` table.

use sqlx::PgPool;

use curator_core::job::WorkflowError;
use curator_core::types::DbId;

use crate::models::workflow_error::{
    CreateWorkflowError, WorkflowErrorListQuery, WorkflowErrorRow,
};

/// Column list for `workflow_errors` queries.
const COLUMNS: &str = "\
    id, user_id, workflow_name, error_message, workflow_execution_id, \
    error_node, error_data, created_at, updated_at";

/// Maximum page size for error listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for error listing.
const DEFAULT_LIMIT: i64 = 50;

/// Provides persistence operations for workflow errors.
pub struct WorkflowErrorRepo;

impl WorkflowErrorRepo {
    /// Record an error reported by the workflow engine.
    pub async fn create(
        pool: &PgPool,
        input: &CreateWorkflowError,
    ) -> Result<WorkflowError, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflow_errors \
                 (user_id, workflow_name, error_message, workflow_execution_id, \
                  error_node, error_data) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, WorkflowErrorRow>(&query)
            .bind(input.user_id)
            .bind(&input.workflow_name)
            .bind(&input.error_message)
            .bind(&input.workflow_execution_id)
            .bind(&input.error_node)
            .bind(&input.error_data)
            .fetch_one(pool)
            .await?;
        Ok(row.into())
    }

    /// List a user's workflow errors, newest first.
    pub async fn list_by_user(
        pool: &PgPool,
        user_id: DbId,
        params: &WorkflowErrorListQuery,
    ) -> Result<Vec<WorkflowError>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_errors \
             WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2"
        );
        let rows = sqlx::query_as::<_, WorkflowErrorRow>(&query)
            .bind(user_id)
            .bind(limit)
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(WorkflowError::from).collect())
    }
}
