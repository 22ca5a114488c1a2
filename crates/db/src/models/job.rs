//! Job rows and DTOs.

use serde::Deserialize;
use sqlx::FromRow;

use curator_core::job::Job;
use curator_core::status::{JobStatus, StatusId};
use curator_core::types::{DbId, Timestamp};

use super::decode_status;

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: DbId,
    pub user_id: DbId,
    pub workflow_name: String,
    pub status_id: StatusId,
    pub resource_id: Option<DbId>,
    pub metadata: serde_json::Value,
    pub error_message: Option<String>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<JobRow> for Job {
    type Error = sqlx::Error;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: row.id,
            user_id: row.user_id,
            workflow_name: row.workflow_name,
            status: decode_status("status_id", row.status_id, JobStatus::from_id)?,
            resource_id: row.resource_id,
            metadata: row.metadata,
            error_message: row.error_message,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            updated_at: row.updated_at,
        })
    }
}

/// Insert DTO for a new pending job.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateJob {
    pub user_id: DbId,
    pub workflow_name: String,
    pub resource_id: Option<DbId>,
    pub metadata: Option<serde_json::Value>,
}

/// Query parameters for `GET /api/v1/jobs`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobListQuery {
    /// Filter by status name (e.g. `running`).
    pub status: Option<JobStatus>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
}
