//! Job, step and workflow-error entities as exchanged over the API and the
//! realtime change feed.
//!
//! The database layer maps its rows into these types; the watcher consumes
//! them without depending on any storage crate.

use serde::{Deserialize, Serialize};

use crate::status::{JobStatus, StepStatus};
use crate::types::{DbId, Timestamp};

/// Metadata key holding the external engine's execution id for a job.
pub const METADATA_WORKFLOW_EXECUTION_ID: &str = "workflow_execution_id";

/// One run of an externally executed workflow. Aggregate root of its steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: DbId,
    pub user_id: DbId,
    pub workflow_name: String,
    pub status: JobStatus,
    pub resource_id: Option<DbId>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

/// An ordered sub-unit of a [`Job`], advanced by the workflow engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStep {
    pub id: DbId,
    pub job_id: DbId,
    pub step_name: String,
    pub step_type: String,
    /// Intended sequence. Not necessarily contiguous: branches may skip.
    pub step_order: i32,
    pub status: StepStatus,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub error_message: Option<String>,
    pub output_data: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A job together with its steps, sorted by `step_order` ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobWithSteps {
    #[serde(flatten)]
    pub job: Job,
    pub steps: Vec<JobStep>,
}

impl JobWithSteps {
    /// Build from a job and an unordered list of its steps.
    pub fn new(job: Job, mut steps: Vec<JobStep>) -> Self {
        steps.sort_by_key(|s| (s.step_order, s.id));
        Self { job, steps }
    }

    /// Step statuses in step order, the input of the aggregate state machine.
    pub fn step_statuses(&self) -> impl Iterator<Item = StepStatus> + '_ {
        self.steps.iter().map(|s| s.status)
    }
}

/// An error raised by the workflow engine outside of any specific step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowError {
    pub id: DbId,
    pub user_id: DbId,
    pub workflow_name: String,
    pub error_message: String,
    pub workflow_execution_id: Option<String>,
    /// Internal identifier of the engine stage that failed.
    pub error_node: Option<String>,
    pub error_data: Option<serde_json::Value>,
    pub created_at: Timestamp,
}

/// Read the engine execution id recorded in a job's metadata, if any.
pub fn workflow_execution_id(metadata: &serde_json::Value) -> Option<&str> {
    metadata
        .get(METADATA_WORKFLOW_EXECUTION_ID)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}
