//! Local view of the user's jobs, kept current from the change feed.

use std::collections::BTreeMap;

use curator_core::job::JobWithSteps;
use curator_core::job_state::{derive_job_status, step_progress};
use curator_core::realtime::{ChangeKind, ChangePayload, RowChange};
use curator_core::types::DbId;

#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: BTreeMap<DbId, JobWithSteps>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the tracked jobs with a fresh listing.
    pub fn load(&mut self, jobs: Vec<JobWithSteps>) {
        self.jobs = jobs.into_iter().map(|j| (j.job.id, j)).collect();
    }

    pub fn get(&self, job_id: DbId) -> Option<&JobWithSteps> {
        self.jobs.get(&job_id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Apply a change and return the affected job, if it is tracked.
    ///
    /// Step changes re-derive the job status locally so the view does not
    /// wait for the job row's own update.
    pub fn apply(&mut self, change: &RowChange) -> Option<DbId> {
        match &change.payload {
            ChangePayload::Jobs { new: Some(job), .. } => {
                match self.jobs.get_mut(&job.id) {
                    Some(tracked) => tracked.job = job.clone(),
                    None => {
                        self.jobs
                            .insert(job.id, JobWithSteps::new(job.clone(), Vec::new()));
                    }
                }
                Some(job.id)
            }
            ChangePayload::Jobs {
                new: None,
                old: Some(job),
            } => self.jobs.remove(&job.id).map(|j| j.job.id),
            ChangePayload::JobSteps { new, old } => {
                let step = new.as_ref().or(old.as_ref())?;
                let tracked = self.jobs.get_mut(&step.job_id)?;

                tracked.steps.retain(|s| s.id != step.id);
                if change.event_type != ChangeKind::Delete {
                    tracked.steps.push(step.clone());
                    tracked.steps.sort_by_key(|s| (s.step_order, s.id));
                }

                let derived = derive_job_status(tracked.job.status, tracked.step_statuses());
                if let Some(status) = derived {
                    tracked.job.status = status;
                }
                Some(tracked.job.id)
            }
            _ => None,
        }
    }

    /// One-line status of a tracked job.
    pub fn summary(&self, job_id: DbId) -> Option<String> {
        let job = self.jobs.get(&job_id)?;
        let progress = step_progress(&job.steps);
        Some(format!(
            "{} #{}: {} ({}/{} steps)",
            job.job.workflow_name, job.job.id, job.job.status, progress.completed, progress.total
        ))
    }
}
