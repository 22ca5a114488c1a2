//! Job step rows and DTOs.

use serde::Deserialize;
use sqlx::FromRow;

use curator_core::job::JobStep;
use curator_core::status::{StatusId, StepStatus};
use curator_core::types::{DbId, Timestamp};

use super::decode_status;

/// A row from the `job_steps` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobStepRow {
    pub id: DbId,
    pub job_id: DbId,
    pub step_name: String,
    pub step_type: String,
    pub step_order: i32,
    pub status_id: StatusId,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub error_message: Option<String>,
    pub output_data: Option<serde_json::Value>,
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<JobStepRow> for JobStep {
    type Error = sqlx::Error;

    fn try_from(row: JobStepRow) -> Result<Self, Self::Error> {
        Ok(JobStep {
            id: row.id,
            job_id: row.job_id,
            step_name: row.step_name,
            step_type: row.step_type,
            step_order: row.step_order,
            status: decode_status("status_id", row.status_id, StepStatus::from_id)?,
            started_at: row.started_at,
            completed_at: row.completed_at,
            error_message: row.error_message,
            output_data: row.output_data,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Insert DTO for one step of a new job.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobStep {
    pub step_name: String,
    pub step_type: String,
    pub step_order: i32,
    pub metadata: Option<serde_json::Value>,
}

/// A resolved step update, timestamps already computed.
#[derive(Debug, Clone)]
pub struct StepStatusUpdate {
    pub status: StepStatus,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    /// Replaces the stored message when set.
    pub error_message: Option<String>,
    /// Replaces the stored output when set.
    pub output_data: Option<serde_json::Value>,
    /// Shallow-merged into the stored metadata when set.
    pub metadata: Option<serde_json::Value>,
}
