//! Shared response envelope types for API handlers.
//!
//! All API responses use a `{ "data": ... }` envelope.

use serde::Serialize;

use curator_core::job::{JobStep, JobWithSteps};

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// Payload of a step update: the updated step plus its whole job.
#[derive(Debug, Serialize)]
pub struct StepUpdateResponse {
    pub step: JobStep,
    pub job: JobWithSteps,
}
