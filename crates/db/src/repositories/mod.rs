//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool`, or an open transaction for the steps of a larger
//! atomic update, as the first argument.

pub mod job_repo;
pub mod job_step_repo;
pub mod workflow_error_repo;

pub use job_repo::JobRepo;
pub use job_step_repo::JobStepRepo;
pub use workflow_error_repo::WorkflowErrorRepo;

/// Open Postgres transaction, as passed to the `*_tx` repository methods.
pub type PgTransaction<'c> = sqlx::Transaction<'c, sqlx::Postgres>;
