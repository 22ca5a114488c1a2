//! Aggregate job/step state machine.
//!
//! Pure functions shared by the mutation endpoints (which persist the
//! result) and the watcher (which applies the same rules to events it
//! observes).

use crate::job::JobStep;
use crate::status::{JobStatus, StepStatus};
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Aggregate status
// ---------------------------------------------------------------------------

/// Decide whether a job's status should change given its steps' statuses.
///
/// Returns `None` when the job keeps its current status:
///
/// 1. terminal jobs never change;
/// 2. any failed step fails the job;
/// 3. otherwise, all steps terminal completes the job;
/// 4. otherwise, a pending job with any progressed step becomes running.
pub fn derive_job_status<I>(current: JobStatus, steps: I) -> Option<JobStatus>
where
    I: IntoIterator<Item = StepStatus>,
{
    if current.is_terminal() {
        return None;
    }

    let mut any_failed = false;
    let mut all_terminal = true;
    let mut any_progress = false;

    for status in steps {
        any_failed |= status == StepStatus::Failed;
        all_terminal &= status.is_terminal();
        any_progress |= status.has_progressed();
    }

    if any_failed {
        Some(JobStatus::Failed)
    } else if all_terminal {
        Some(JobStatus::Completed)
    } else if current == JobStatus::Pending && any_progress {
        Some(JobStatus::Running)
    } else {
        None
    }
}

/// A status change to apply to a job, with the timestamps it implies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTransition {
    pub status: JobStatus,
    /// Existing `started_at`, or `now` the first time the job leaves pending.
    pub started_at: Timestamp,
    /// Set for terminal statuses only.
    pub completed_at: Option<Timestamp>,
    /// Error copied onto a failed job. `None` leaves the stored value alone.
    pub error_message: Option<String>,
}

impl JobTransition {
    /// Carry the failing step's error onto a failed job.
    pub fn with_step_error(mut self, steps: &[JobStep]) -> Self {
        if self.status == JobStatus::Failed {
            self.error_message = failed_step_error(steps).map(str::to_string);
        }
        self
    }
}

/// Error of the lowest-order failed step that reported one.
pub fn failed_step_error(steps: &[JobStep]) -> Option<&str> {
    steps
        .iter()
        .filter(|s| s.status == StepStatus::Failed)
        .filter_map(|s| s.error_message.as_deref().map(|e| (s.step_order, e)))
        .min_by_key(|(order, _)| *order)
        .map(|(_, error)| error)
}

/// Plan the job update following a step change.
///
/// `started_at` is populated even when the job jumps straight from
/// pending to a terminal status.
pub fn plan_job_transition<I>(
    current: JobStatus,
    started_at: Option<Timestamp>,
    steps: I,
    now: Timestamp,
) -> Option<JobTransition>
where
    I: IntoIterator<Item = StepStatus>,
{
    let status = derive_job_status(current, steps)?;
    Some(JobTransition {
        status,
        started_at: started_at.unwrap_or(now),
        completed_at: status.is_terminal().then_some(now),
        error_message: None,
    })
}

// ---------------------------------------------------------------------------
// Step timestamps
// ---------------------------------------------------------------------------

/// The pair of lifecycle timestamps carried by a step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepTimestamps {
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

/// Compute a step's timestamps after it moves to `new_status`.
///
/// `started_at` is set the first time the step leaves pending and then
/// kept. `completed_at` is non-null iff the new status is terminal.
pub fn step_timestamps(
    new_status: StepStatus,
    current: StepTimestamps,
    now: Timestamp,
) -> StepTimestamps {
    let started_at = if new_status.has_progressed() {
        Some(current.started_at.unwrap_or(now))
    } else {
        current.started_at
    };

    let completed_at = if new_status.is_terminal() {
        Some(current.completed_at.unwrap_or(now))
    } else {
        None
    };

    StepTimestamps {
        started_at,
        completed_at,
    }
}

// ---------------------------------------------------------------------------
// Next-step inference
// ---------------------------------------------------------------------------

/// Infer the step the workflow is currently working on.
///
/// Prefers the lowest-order running step. Otherwise picks the lowest-order
/// pending step beyond the furthest terminal step, so pending steps left
/// behind by a skipped branch are not reported as next. Falls back to the
/// lowest-order running-or-pending step.
pub fn current_step(steps: &[JobStep]) -> Option<&JobStep> {
    let running = steps
        .iter()
        .filter(|s| s.status == StepStatus::Running)
        .min_by_key(|s| s.step_order);
    if running.is_some() {
        return running;
    }

    let frontier = steps
        .iter()
        .filter(|s| s.status.is_terminal())
        .map(|s| s.step_order)
        .max();

    steps
        .iter()
        .filter(|s| s.status == StepStatus::Pending)
        .filter(|s| frontier.map_or(true, |max| s.step_order > max))
        .min_by_key(|s| s.step_order)
        .or_else(|| {
            steps
                .iter()
                .filter(|s| matches!(s.status, StepStatus::Running | StepStatus::Pending))
                .min_by_key(|s| s.step_order)
        })
}

/// How far a job has progressed through its steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepProgress {
    /// Steps in a terminal status (completed, failed or skipped).
    pub completed: usize,
    pub total: usize,
}

impl StepProgress {
    pub fn is_finished(&self) -> bool {
        self.completed == self.total
    }
}

/// Count terminal steps against the total.
pub fn step_progress(steps: &[JobStep]) -> StepProgress {
    StepProgress {
        completed: steps.iter().filter(|s| s.status.is_terminal()).count(),
        total: steps.len(),
    }
}
