//! Notification deduplication and dispatch.
//!
//! [`NotificationDispatcher`] is the single entry point for row changes,
//! whether they arrived live or were synthesized by the poller. It keys
//! every notifiable transition with a [`TransitionKey`] and emits each key
//! at most once per session, so overlapping transports never double
//! notify.

pub mod message;
pub mod sink;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use curator_core::job::{Job, JobStep, JobWithSteps, WorkflowError};
use curator_core::job_state::{derive_job_status, failed_step_error, step_progress};
use curator_core::realtime::{ChangeKind, ChangePayload, RowChange};
use curator_core::status::{JobStatus, StepStatus};
use curator_core::step_outcome::{classify_step, StepOutcome};
use curator_core::types::DbId;

use crate::api::{ApiClient, ApiClientError};

pub use sink::{NotificationSink, TerminalSink};

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Visual severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Failures. Stays on screen until dismissed.
    Destructive,
    Success,
    /// Informational outcomes such as an existing library entry.
    Primary,
    /// Ongoing work.
    Neutral,
}

/// An action the UI performs a short while after showing a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    NavigateToResource { resource_id: DbId, after: Duration },
    RefreshView { after: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub description: Option<String>,
    pub variant: Variant,
    /// On-screen time; `None` means persistent.
    pub duration: Option<Duration>,
    pub follow_up: Option<FollowUp>,
}

impl Notification {
    /// A notification with the default duration for its variant.
    pub fn new(variant: Variant, title: impl Into<String>) -> Self {
        let duration = match variant {
            Variant::Destructive => None,
            _ => Some(message::DEFAULT_DURATION),
        };
        Self {
            title: title.into(),
            description: None,
            variant,
            duration,
            follow_up: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_follow_up(mut self, follow_up: FollowUp) -> Self {
        self.follow_up = Some(follow_up);
        self
    }
}

// ---------------------------------------------------------------------------
// Dedup keys
// ---------------------------------------------------------------------------

/// Identity of a notifiable transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionKey {
    JobCreated(DbId),
    Job {
        job_id: DbId,
        status: JobStatus,
    },
    Step {
        job_id: DbId,
        step_id: DbId,
        status: StepStatus,
    },
    WorkflowError(DbId),
}

// ---------------------------------------------------------------------------
// Job lookup
// ---------------------------------------------------------------------------

/// Source of fresh job detail used to build step messages.
#[async_trait]
pub trait JobLookup: Send + Sync {
    async fn job_with_steps(&self, job_id: DbId) -> Result<JobWithSteps, ApiClientError>;
}

#[async_trait]
impl JobLookup for ApiClient {
    async fn job_with_steps(&self, job_id: DbId) -> Result<JobWithSteps, ApiClientError> {
        self.get_job(job_id).await
    }
}

#[async_trait]
impl<T: JobLookup + ?Sized> JobLookup for Arc<T> {
    async fn job_with_steps(&self, job_id: DbId) -> Result<JobWithSteps, ApiClientError> {
        (**self).job_with_steps(job_id).await
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Step statuses worth telling the user about.
const NOTIFIABLE_STEP_STATUSES: [StepStatus; 3] =
    [StepStatus::Running, StepStatus::Completed, StepStatus::Failed];

pub struct NotificationDispatcher<L, S> {
    lookup: L,
    sink: S,
    seen: HashSet<TransitionKey>,
    /// Last status observed per job, used to silence steps of failed jobs.
    job_status: HashMap<DbId, JobStatus>,
}

impl<L: JobLookup, S: NotificationSink> NotificationDispatcher<L, S> {
    pub fn new(lookup: L, sink: S) -> Self {
        Self {
            lookup,
            sink,
            seen: HashSet::new(),
            job_status: HashMap::new(),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Whether `key` has already been notified.
    pub fn has_seen(&self, key: &TransitionKey) -> bool {
        self.seen.contains(key)
    }

    /// Handle one change. Never fails: lookup errors skip the notification.
    pub async fn handle(&mut self, change: &RowChange) {
        match (&change.payload, change.event_type) {
            (ChangePayload::Jobs { new: Some(job), .. }, ChangeKind::Insert) => {
                self.on_job_inserted(job)
            }
            (ChangePayload::Jobs { new: Some(job), .. }, ChangeKind::Update) => {
                self.on_job_updated(job)
            }
            (ChangePayload::JobSteps { new: Some(step), old }, ChangeKind::Update) => {
                self.on_step_updated(step, old.as_ref()).await
            }
            (ChangePayload::WorkflowErrors { new: Some(error), .. }, ChangeKind::Insert) => {
                self.on_workflow_error(error)
            }
            _ => {}
        }
    }

    fn on_job_inserted(&mut self, job: &Job) {
        self.job_status.insert(job.id, job.status);
        if self.seen.insert(TransitionKey::JobCreated(job.id)) {
            self.sink.notify(message::job_started(job));
        }
    }

    fn on_job_updated(&mut self, job: &Job) {
        self.job_status.insert(job.id, job.status);
        if job.status != JobStatus::Failed {
            return;
        }
        let key = TransitionKey::Job {
            job_id: job.id,
            status: JobStatus::Failed,
        };
        if self.seen.insert(key) {
            self.sink.notify(message::job_failed(job, None));
        }
    }

    async fn on_step_updated(&mut self, step: &JobStep, old: Option<&JobStep>) {
        if old.is_some_and(|old| old.status == step.status) {
            return;
        }
        if !NOTIFIABLE_STEP_STATUSES.contains(&step.status) {
            return;
        }
        if self.job_status.get(&step.job_id) == Some(&JobStatus::Failed) {
            return;
        }
        let key = TransitionKey::Step {
            job_id: step.job_id,
            step_id: step.id,
            status: step.status,
        };
        if self.seen.contains(&key) {
            return;
        }

        let mut job = match self.lookup.job_with_steps(step.job_id).await {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!(
                    job_id = step.job_id,
                    step_id = step.id,
                    error = %e,
                    "Failed to load job for step notification",
                );
                return;
            }
        };
        overlay_step(&mut job, step);
        self.seen.insert(key);

        let derived = derive_job_status(job.job.status, job.step_statuses());
        let job_failed = job.job.status == JobStatus::Failed || derived == Some(JobStatus::Failed);
        if !job_failed {
            self.job_status.insert(job.job.id, job.job.status);
            let notification = if self.finishes_workflow(&job, step) {
                Some(message::workflow_complete(&job))
            } else {
                message::step_message(&job, step)
            };
            if let Some(notification) = notification {
                self.sink.notify(notification);
            }
            return;
        }

        self.job_status.insert(job.job.id, JobStatus::Failed);
        let job_key = TransitionKey::Job {
            job_id: job.job.id,
            status: JobStatus::Failed,
        };
        if !self.seen.insert(job_key) {
            return;
        }
        let notification = match step.status {
            StepStatus::Failed => message::step_message(&job, step),
            _ => None,
        };
        let notification = notification
            .unwrap_or_else(|| message::job_failed(&job.job, failed_step_error(&job.steps)));
        self.sink.notify(notification);
    }

    /// Whether this completion is the one that reports the finished
    /// workflow. Several completions can observe an all-done refetch; only
    /// the first claims the job's completed key.
    fn finishes_workflow(&mut self, job: &JobWithSteps, step: &JobStep) -> bool {
        step.status == StepStatus::Completed
            && classify_step(step) == StepOutcome::Standard
            && step_progress(&job.steps).is_finished()
            && self.seen.insert(TransitionKey::Job {
                job_id: job.job.id,
                status: JobStatus::Completed,
            })
    }

    fn on_workflow_error(&mut self, error: &WorkflowError) {
        if self.seen.insert(TransitionKey::WorkflowError(error.id)) {
            self.sink.notify(message::workflow_error(error));
        }
    }
}

/// Replace the refetched copy of `step` with the image from the event.
fn overlay_step(job: &mut JobWithSteps, step: &JobStep) {
    match job.steps.iter_mut().find(|s| s.id == step.id) {
        Some(existing) => *existing = step.clone(),
        None => {
            job.steps.push(step.clone());
            job.steps.sort_by_key(|s| (s.step_order, s.id));
        }
    }
}
