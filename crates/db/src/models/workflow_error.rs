//! Workflow error rows and DTOs.

use serde::Deserialize;
use sqlx::FromRow;

use curator_core::job::WorkflowError;
use curator_core::types::{DbId, Timestamp};

/// A row from the `workflow_errors` table.
#[derive(Debug, Clone, FromRow)]
pub struct WorkflowErrorRow {
    pub id: DbId,
    pub user_id: DbId,
    pub workflow_name: String,
    pub error_message: String,
    pub workflow_execution_id: Option<String>,
    pub error_node: Option<String>,
    pub error_data: Option<serde_json::Value>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<WorkflowErrorRow> for WorkflowError {
    fn from(row: WorkflowErrorRow) -> Self {
        WorkflowError {
            id: row.id,
            user_id: row.user_id,
            workflow_name: row.workflow_name,
            error_message: row.error_message,
            workflow_execution_id: row.workflow_execution_id,
            error_node: row.error_node,
            error_data: row.error_data,
            created_at: row.created_at,
        }
    }
}

/// Insert DTO for a reported workflow error, owner already resolved.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorkflowError {
    pub user_id: DbId,
    pub workflow_name: String,
    pub error_message: String,
    pub workflow_execution_id: Option<String>,
    pub error_node: Option<String>,
    pub error_data: Option<serde_json::Value>,
}

/// Query parameters for `GET /api/v1/workflow-errors`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowErrorListQuery {
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
}
