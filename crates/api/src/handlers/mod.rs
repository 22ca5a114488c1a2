//! HTTP request handlers, one module per resource.

pub mod jobs;
pub mod workflow_errors;
