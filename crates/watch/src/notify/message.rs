//! Notification wording.
//!
//! Pure builders from job state to [`Notification`]s. Duplicate-link
//! outcomes get their own messages; everything else follows the step's
//! status. Whether a completion finishes the workflow is the dispatcher's
//! call, see [`workflow_complete`].

use std::time::Duration;

use curator_core::job::{Job, JobStep, JobWithSteps, WorkflowError};
use curator_core::job_state::{current_step, step_progress};
use curator_core::stage_labels::{stage_label, UNKNOWN_STAGE};
use curator_core::status::StepStatus;
use curator_core::step_outcome::{classify_step, existing_resource, StepOutcome};

use super::{FollowUp, Notification, Variant};

pub const DEFAULT_DURATION: Duration = Duration::from_secs(5);

/// Running steps stay up longer.
pub const RUNNING_DURATION: Duration = Duration::from_secs(8);

pub const NAVIGATE_DELAY: Duration = Duration::from_millis(1500);

pub const REFRESH_DELAY: Duration = Duration::from_millis(1000);

pub const GENERIC_FAILURE: &str = "Something went wrong while processing your link.";

pub fn job_started(job: &Job) -> Notification {
    Notification::new(Variant::Neutral, "Processing started")
        .with_description(stage_label(&job.workflow_name))
}

/// Failure of the whole job. Prefers the job's own error message.
pub fn job_failed(job: &Job, fallback_error: Option<&str>) -> Notification {
    let description = job
        .error_message
        .as_deref()
        .or(fallback_error)
        .unwrap_or(GENERIC_FAILURE);
    Notification::new(Variant::Destructive, "Processing failed").with_description(description)
}

/// Message for a step entering `step.status`, or `None` when the
/// transition is silent.
pub fn step_message(job: &JobWithSteps, step: &JobStep) -> Option<Notification> {
    let outcome = classify_step(step);
    let label = stage_label(&step.step_name);

    match step.status {
        StepStatus::Running => {
            let position = job
                .steps
                .iter()
                .position(|s| s.id == step.id)
                .map_or(job.steps.len(), |i| i + 1);
            Some(
                Notification::new(Variant::Neutral, format!("{label} in progress"))
                    .with_description(format!("Step {position} of {}", job.steps.len()))
                    .with_duration(RUNNING_DURATION),
            )
        }
        StepStatus::Failed => {
            let error = step.error_message.as_deref().unwrap_or(GENERIC_FAILURE);
            let title = if outcome.is_duplicate() {
                "Duplicate check failed".to_string()
            } else {
                format!("{label} failed")
            };
            Some(Notification::new(Variant::Destructive, title).with_description(error))
        }
        StepStatus::Completed => completed_message(job, step, outcome, &label),
        StepStatus::Pending | StepStatus::Skipped => None,
    }
}

fn completed_message(
    job: &JobWithSteps,
    step: &JobStep,
    outcome: StepOutcome,
    label: &str,
) -> Option<Notification> {
    match outcome {
        StepOutcome::DuplicateOtherUser => None,
        StepOutcome::DuplicateSameUser => {
            let existing = existing_resource(step);
            let description = match existing.title {
                Some(title) => format!("\"{title}\" is already saved."),
                None => "This link was saved before.".to_string(),
            };
            let mut notification = Notification::new(Variant::Primary, "Already in your library")
                .with_description(description);
            if let Some(resource_id) = existing.id {
                notification = notification.with_follow_up(FollowUp::NavigateToResource {
                    resource_id,
                    after: NAVIGATE_DELAY,
                });
            }
            Some(notification)
        }
        StepOutcome::Standard => {
            let notification = Notification::new(Variant::Success, format!("{label} done"));
            Some(match current_step(&job.steps) {
                Some(next) => notification
                    .with_description(format!("Next: {}", stage_label(&next.step_name))),
                None => notification,
            })
        }
    }
}

/// The whole workflow finished. Shown once per job, in place of the
/// final step's own completion message.
pub fn workflow_complete(job: &JobWithSteps) -> Notification {
    Notification::new(Variant::Success, "Processing complete")
        .with_description(format!("All {} steps finished", step_progress(&job.steps).total))
        .with_follow_up(FollowUp::RefreshView {
            after: REFRESH_DELAY,
        })
}

/// Error raised by the engine outside of any step.
pub fn workflow_error(error: &WorkflowError) -> Notification {
    let stage = error
        .error_node
        .as_deref()
        .map(stage_label)
        .unwrap_or_else(|| UNKNOWN_STAGE.to_string());
    Notification::new(Variant::Destructive, format!("{stage} failed"))
        .with_description(error.error_message.clone())
}
