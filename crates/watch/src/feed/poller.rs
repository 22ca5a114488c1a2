//! Polling fallback: periodic snapshots diffed into synthetic changes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use curator_core::job::{JobStep, JobWithSteps, WorkflowError};
use curator_core::realtime::RowChange;
use curator_core::types::DbId;

use super::FeedError;
use crate::api::ApiClient;

/// Produces synthetic row changes while the live channel is unavailable.
#[async_trait]
pub trait Poller: Send + 'static {
    /// Fetch the current state and return what changed since the last call.
    async fn poll(&mut self) -> Result<Vec<RowChange>, FeedError>;
}

/// The rows visible to the watching user at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    jobs: BTreeMap<DbId, JobWithSteps>,
    errors: BTreeMap<DbId, WorkflowError>,
}

impl Snapshot {
    pub fn new(jobs: Vec<JobWithSteps>, errors: Vec<WorkflowError>) -> Self {
        Self {
            jobs: jobs.into_iter().map(|j| (j.job.id, j)).collect(),
            errors: errors.into_iter().map(|e| (e.id, e)).collect(),
        }
    }

    /// Changes that turn `self` into `next`, jobs in id order, each job's
    /// row before its steps.
    ///
    /// Jobs missing from `next` produce nothing: the listing is a window
    /// of recent jobs, so absence does not mean deletion. Steps missing
    /// from a job that is still listed are reported as deleted.
    pub fn diff(&self, next: &Snapshot) -> Vec<RowChange> {
        let mut changes = Vec::new();

        for (id, current) in &next.jobs {
            let owner_id = current.job.user_id;
            match self.jobs.get(id) {
                None => {
                    changes.push(RowChange::job_inserted(current.job.clone()));
                    changes.extend(
                        current
                            .steps
                            .iter()
                            .cloned()
                            .map(|step| RowChange::step_inserted(owner_id, step)),
                    );
                }
                Some(previous) => {
                    if previous.job != current.job {
                        changes.push(RowChange::job_updated(
                            Some(previous.job.clone()),
                            current.job.clone(),
                        ));
                    }
                    diff_steps(owner_id, &previous.steps, &current.steps, &mut changes);
                }
            }
        }

        for (id, error) in &next.errors {
            if !self.errors.contains_key(id) {
                changes.push(RowChange::workflow_error_inserted(error.clone()));
            }
        }

        changes
    }
}

fn diff_steps(owner_id: DbId, previous: &[JobStep], current: &[JobStep], out: &mut Vec<RowChange>) {
    let before: HashMap<DbId, &JobStep> = previous.iter().map(|s| (s.id, s)).collect();

    for step in current {
        match before.get(&step.id) {
            None => out.push(RowChange::step_inserted(owner_id, step.clone())),
            Some(old) if *old != step => out.push(RowChange::step_updated(
                owner_id,
                Some((*old).clone()),
                step.clone(),
            )),
            Some(_) => {}
        }
    }

    let still_present: HashSet<DbId> = current.iter().map(|s| s.id).collect();
    for step in previous.iter().filter(|s| !still_present.contains(&s.id)) {
        out.push(RowChange::step_deleted(owner_id, step.clone()));
    }
}

/// [`Poller`] backed by the REST API.
///
/// The first successful poll only records a baseline unless one was
/// supplied up front.
pub struct SnapshotPoller {
    api: Arc<ApiClient>,
    last: Option<Snapshot>,
}

impl SnapshotPoller {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api, last: None }
    }

    /// Start from a snapshot the caller already fetched.
    pub fn with_baseline(api: Arc<ApiClient>, baseline: Snapshot) -> Self {
        Self {
            api,
            last: Some(baseline),
        }
    }
}

#[async_trait]
impl Poller for SnapshotPoller {
    async fn poll(&mut self) -> Result<Vec<RowChange>, FeedError> {
        let (jobs, errors) =
            tokio::try_join!(self.api.list_jobs(), self.api.list_workflow_errors())?;
        let next = Snapshot::new(jobs, errors);

        let changes = match &self.last {
            Some(previous) => previous.diff(&next),
            None => {
                tracing::debug!(jobs = next.jobs.len(), "Polling baseline recorded");
                Vec::new()
            }
        };
        self.last = Some(next);
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use curator_core::job::Job;
    use curator_core::realtime::{ChangeKind, ChangePayload, Table};
    use curator_core::status::{JobStatus, StepStatus};

    use super::*;

    fn ts() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn job(id: DbId, status: JobStatus) -> Job {
        Job {
            id,
            user_id: 7,
            workflow_name: "ingest_link".into(),
            status,
            resource_id: None,
            metadata: serde_json::json!({}),
            error_message: None,
            created_at: ts(),
            started_at: None,
            completed_at: None,
            updated_at: ts(),
        }
    }

    fn step(id: DbId, job_id: DbId, order: i32, status: StepStatus) -> JobStep {
        JobStep {
            id,
            job_id,
            step_name: format!("step_{order}"),
            step_type: "task".into(),
            step_order: order,
            status,
            started_at: None,
            completed_at: None,
            error_message: None,
            output_data: None,
            metadata: serde_json::json!({}),
            created_at: ts(),
            updated_at: ts(),
        }
    }

    fn kinds(changes: &[RowChange]) -> Vec<(Table, ChangeKind)> {
        changes.iter().map(|c| (c.table(), c.event_type)).collect()
    }

    #[test]
    fn identical_snapshots_produce_nothing() {
        let jobs = vec![JobWithSteps::new(
            job(1, JobStatus::Running),
            vec![step(10, 1, 1, StepStatus::Running)],
        )];
        let a = Snapshot::new(jobs.clone(), vec![]);
        let b = Snapshot::new(jobs, vec![]);
        assert!(a.diff(&b).is_empty());
    }

    #[test]
    fn new_job_yields_job_then_step_inserts() {
        let before = Snapshot::default();
        let after = Snapshot::new(
            vec![JobWithSteps::new(
                job(1, JobStatus::Pending),
                vec![
                    step(10, 1, 1, StepStatus::Pending),
                    step(11, 1, 2, StepStatus::Pending),
                ],
            )],
            vec![],
        );

        let changes = before.diff(&after);

        assert_eq!(
            kinds(&changes),
            vec![
                (Table::Jobs, ChangeKind::Insert),
                (Table::JobSteps, ChangeKind::Insert),
                (Table::JobSteps, ChangeKind::Insert),
            ]
        );
        assert!(changes.iter().all(|c| c.owner_id == 7));
    }

    #[test]
    fn step_status_change_yields_update_with_old_row() {
        let before = Snapshot::new(
            vec![JobWithSteps::new(
                job(1, JobStatus::Pending),
                vec![step(10, 1, 1, StepStatus::Pending)],
            )],
            vec![],
        );
        let after = Snapshot::new(
            vec![JobWithSteps::new(
                job(1, JobStatus::Running),
                vec![step(10, 1, 1, StepStatus::Running)],
            )],
            vec![],
        );

        let changes = before.diff(&after);

        assert_eq!(
            kinds(&changes),
            vec![
                (Table::Jobs, ChangeKind::Update),
                (Table::JobSteps, ChangeKind::Update),
            ]
        );
        match &changes[1].payload {
            ChangePayload::JobSteps {
                new: Some(new),
                old: Some(old),
            } => {
                assert_eq!(old.status, StepStatus::Pending);
                assert_eq!(new.status, StepStatus::Running);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn jobs_leaving_the_window_are_not_deleted() {
        let before = Snapshot::new(
            vec![JobWithSteps::new(job(1, JobStatus::Completed), vec![])],
            vec![],
        );
        assert!(before.diff(&Snapshot::default()).is_empty());
    }

    #[test]
    fn removed_step_of_listed_job_is_deleted() {
        let before = Snapshot::new(
            vec![JobWithSteps::new(
                job(1, JobStatus::Running),
                vec![step(10, 1, 1, StepStatus::Running)],
            )],
            vec![],
        );
        let after = Snapshot::new(
            vec![JobWithSteps::new(job(1, JobStatus::Running), vec![])],
            vec![],
        );

        assert_eq!(
            kinds(&before.diff(&after)),
            vec![(Table::JobSteps, ChangeKind::Delete)]
        );
    }

    #[test]
    fn new_workflow_errors_are_inserted_once() {
        let error = WorkflowError {
            id: 5,
            user_id: 7,
            workflow_name: "ingest_link".into(),
            error_message: "engine down".into(),
            workflow_execution_id: None,
            error_node: Some("summarize".into()),
            error_data: None,
            created_at: ts(),
        };
        let before = Snapshot::default();
        let after = Snapshot::new(vec![], vec![error]);

        assert_eq!(
            kinds(&before.diff(&after)),
            vec![(Table::WorkflowErrors, ChangeKind::Insert)]
        );
        assert!(after.diff(&after.clone()).is_empty());
    }
}
