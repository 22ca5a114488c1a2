//! Realtime change feed wire protocol.
//!
//! The server publishes a [`RowChange`] for every committed mutation of a
//! watched table. Clients open a WebSocket, send [`ClientFrame::Subscribe`]
//! per topic and receive [`ServerFrame::Change`] frames for rows they own.
//! The polling fallback synthesizes the same `RowChange` values from
//! snapshots, so consumers handle a single event shape.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job::{Job, JobStep, WorkflowError};
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Tables and event kinds
// ---------------------------------------------------------------------------

/// A table whose row changes are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Jobs,
    JobSteps,
    WorkflowErrors,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::Jobs, Table::JobSteps, Table::WorkflowErrors];

    pub fn as_str(self) -> &'static str {
        match self {
            Table::Jobs => "jobs",
            Table::JobSteps => "job_steps",
            Table::WorkflowErrors => "workflow_errors",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which change kinds a subscription wants: one kind or `*` for all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EventFilter {
    All,
    Only(ChangeKind),
}

impl EventFilter {
    pub fn matches(self, kind: ChangeKind) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Only(k) => k == kind,
        }
    }
}

impl FromStr for EventFilter {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "*" => Ok(EventFilter::All),
            "INSERT" => Ok(EventFilter::Only(ChangeKind::Insert)),
            "UPDATE" => Ok(EventFilter::Only(ChangeKind::Update)),
            "DELETE" => Ok(EventFilter::Only(ChangeKind::Delete)),
            _ => Err(CoreError::Validation(format!("Unknown event filter '{s}'"))),
        }
    }
}

impl TryFrom<String> for EventFilter {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EventFilter> for String {
    fn from(value: EventFilter) -> Self {
        match value {
            EventFilter::All => "*".to_string(),
            EventFilter::Only(kind) => kind.as_str().to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Row changes
// ---------------------------------------------------------------------------

/// The before/after images of a changed row, tagged by table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum ChangePayload {
    Jobs {
        new: Option<Job>,
        old: Option<Job>,
    },
    JobSteps {
        new: Option<JobStep>,
        old: Option<JobStep>,
    },
    WorkflowErrors {
        new: Option<WorkflowError>,
        old: Option<WorkflowError>,
    },
}

impl ChangePayload {
    pub fn table(&self) -> Table {
        match self {
            ChangePayload::Jobs { .. } => Table::Jobs,
            ChangePayload::JobSteps { .. } => Table::JobSteps,
            ChangePayload::WorkflowErrors { .. } => Table::WorkflowErrors,
        }
    }
}

/// One committed change to a watched row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    pub event_type: ChangeKind,
    /// The user who owns the changed row. Delivery is scoped to this user.
    pub owner_id: DbId,
    pub payload: ChangePayload,
}

impl RowChange {
    pub fn job_inserted(job: Job) -> Self {
        Self {
            event_type: ChangeKind::Insert,
            owner_id: job.user_id,
            payload: ChangePayload::Jobs {
                new: Some(job),
                old: None,
            },
        }
    }

    pub fn job_updated(old: Option<Job>, new: Job) -> Self {
        Self {
            event_type: ChangeKind::Update,
            owner_id: new.user_id,
            payload: ChangePayload::Jobs {
                new: Some(new),
                old,
            },
        }
    }

    pub fn job_deleted(old: Job) -> Self {
        Self {
            event_type: ChangeKind::Delete,
            owner_id: old.user_id,
            payload: ChangePayload::Jobs {
                new: None,
                old: Some(old),
            },
        }
    }

    pub fn step_inserted(owner_id: DbId, step: JobStep) -> Self {
        Self {
            event_type: ChangeKind::Insert,
            owner_id,
            payload: ChangePayload::JobSteps {
                new: Some(step),
                old: None,
            },
        }
    }

    pub fn step_updated(owner_id: DbId, old: Option<JobStep>, new: JobStep) -> Self {
        Self {
            event_type: ChangeKind::Update,
            owner_id,
            payload: ChangePayload::JobSteps {
                new: Some(new),
                old,
            },
        }
    }

    pub fn step_deleted(owner_id: DbId, old: JobStep) -> Self {
        Self {
            event_type: ChangeKind::Delete,
            owner_id,
            payload: ChangePayload::JobSteps {
                new: None,
                old: Some(old),
            },
        }
    }

    pub fn workflow_error_inserted(error: WorkflowError) -> Self {
        Self {
            event_type: ChangeKind::Insert,
            owner_id: error.user_id,
            payload: ChangePayload::WorkflowErrors {
                new: Some(error),
                old: None,
            },
        }
    }

    pub fn table(&self) -> Table {
        self.payload.table()
    }

    /// The job this change belongs to, if any.
    pub fn job_id(&self) -> Option<DbId> {
        match &self.payload {
            ChangePayload::Jobs { new, old } => new.as_ref().or(old.as_ref()).map(|j| j.id),
            ChangePayload::JobSteps { new, old } => {
                new.as_ref().or(old.as_ref()).map(|s| s.job_id)
            }
            ChangePayload::WorkflowErrors { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Subscriptions and frames
// ---------------------------------------------------------------------------

/// What a subscribed topic wants to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscription {
    pub table: Table,
    pub event: EventFilter,
}

impl Subscription {
    pub fn new(table: Table, event: EventFilter) -> Self {
        Self { table, event }
    }

    pub fn matches(&self, change: &RowChange) -> bool {
        self.table == change.table() && self.event.matches(change.event_type)
    }
}

/// Frames sent by a client over the change feed socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe {
        topic: String,
        table: Table,
        event: EventFilter,
    },
    Unsubscribe {
        topic: String,
    },
}

/// Frames sent by the server over the change feed socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Subscribed { topic: String },
    SubscriptionError { topic: String, reason: String },
    Change { topic: String, change: RowChange },
}
