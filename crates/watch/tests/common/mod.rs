#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use curator_core::job::{Job, JobStep, JobWithSteps, WorkflowError};
use curator_core::realtime::RowChange;
use curator_core::status::{JobStatus, StepStatus};
use curator_core::types::DbId;
use curator_watch::api::ApiClientError;
use curator_watch::feed::{
    FeedError, LiveSession, LiveTransport, Poller, SignalSender, Source, TransportError,
};
use curator_watch::notify::JobLookup;

pub const OWNER: DbId = 7;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn ts() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

pub fn job(id: DbId, status: JobStatus) -> Job {
    Job {
        id,
        user_id: OWNER,
        workflow_name: "ingest_link".to_string(),
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

pub fn step(id: DbId, job_id: DbId, name: &str, order: i32, status: StepStatus) -> JobStep {
    JobStep {
        id,
        job_id,
        step_name: name.to_string(),
        step_type: "task".to_string(),
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

pub fn workflow_error(id: DbId, node: Option<&str>, message: &str) -> WorkflowError {
    WorkflowError {
        id,
        user_id: OWNER,
        workflow_name: "ingest_link".to_string(),
        error_message: message.to_string(),
        workflow_execution_id: Some("exec-1".to_string()),
        error_node: node.map(str::to_string),
        error_data: None,
        created_at: ts(),
    }
}

/// A step moving from `from` to its current status.
pub fn step_change(step: &JobStep, from: StepStatus) -> RowChange {
    let mut old = step.clone();
    old.status = from;
    RowChange::step_updated(OWNER, Some(old), step.clone())
}

// ---------------------------------------------------------------------------
// Fake transport
// ---------------------------------------------------------------------------

/// Hands every opened session's sender to the test. Scripted failures are
/// consumed one per connection attempt before any session opens.
pub struct FakeTransport {
    sessions: mpsc::UnboundedSender<SignalSender>,
    failures: Mutex<VecDeque<TransportError>>,
}

impl FakeTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SignalSender>) {
        Self::failing_with(Vec::new())
    }

    pub fn failing_with(
        failures: Vec<TransportError>,
    ) -> (Self, mpsc::UnboundedReceiver<SignalSender>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            sessions: tx,
            failures: Mutex::new(failures.into()),
        };
        (transport, rx)
    }
}

#[async_trait]
impl LiveTransport for FakeTransport {
    async fn connect(
        &self,
        generation: u64,
        _sources: &[Source],
    ) -> Result<LiveSession, TransportError> {
        if let Some(failure) = self.failures.lock().unwrap().pop_front() {
            return Err(failure);
        }
        let (session, sender) = LiveSession::channel(generation);
        let _ = self.sessions.send(sender);
        Ok(session)
    }
}

// ---------------------------------------------------------------------------
// Fake poller
// ---------------------------------------------------------------------------

/// Returns queued batches in order, then empty batches. Counts polls.
#[derive(Clone, Default)]
pub struct FakePoller {
    batches: Arc<Mutex<VecDeque<Vec<RowChange>>>>,
    polls: Arc<AtomicUsize>,
}

impl FakePoller {
    pub fn push(&self, batch: Vec<RowChange>) {
        self.batches.lock().unwrap().push_back(batch);
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Poller for FakePoller {
    async fn poll(&mut self) -> Result<Vec<RowChange>, FeedError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(self.batches.lock().unwrap().pop_front().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Fake job lookup
// ---------------------------------------------------------------------------

/// Serves jobs from a map. Unknown jobs fail like an API error.
#[derive(Clone, Default)]
pub struct FakeLookup {
    jobs: Arc<Mutex<HashMap<DbId, JobWithSteps>>>,
    calls: Arc<AtomicUsize>,
}

impl FakeLookup {
    pub fn put(&self, job: JobWithSteps) {
        self.jobs.lock().unwrap().insert(job.job.id, job);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobLookup for FakeLookup {
    async fn job_with_steps(&self, job_id: DbId) -> Result<JobWithSteps, ApiClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.jobs
            .lock()
            .unwrap()
            .get(&job_id)
            .cloned()
            .ok_or_else(|| ApiClientError::Api {
                status: 404,
                body: "Job not found".to_string(),
            })
    }
}
