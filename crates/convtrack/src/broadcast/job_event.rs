//! Job events and the engine-wide event feed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::job::{Job, JobStatus};

/// What happened to a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobEventKind {
    Created,
    Progress,
    Completed,
    Failed,
    Cancelled,
    /// The job was reclaimed. Only sent on the engine-wide feed.
    Removed,
}

impl JobEventKind {
    /// Event kind announcing that a job entered `status`.
    pub fn for_status(status: JobStatus) -> Self {
        match status {
            JobStatus::Queued => JobEventKind::Created,
            JobStatus::Processing => JobEventKind::Progress,
            JobStatus::Completed => JobEventKind::Completed,
            JobStatus::Failed => JobEventKind::Failed,
            JobStatus::Cancelled => JobEventKind::Cancelled,
        }
    }
}

impl std::fmt::Display for JobEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobEventKind::Created => write!(f, "Created"),
            JobEventKind::Progress => write!(f, "Progress"),
            JobEventKind::Completed => write!(f, "Completed"),
            JobEventKind::Failed => write!(f, "Failed"),
            JobEventKind::Cancelled => write!(f, "Cancelled"),
            JobEventKind::Removed => write!(f, "Removed"),
        }
    }
}

/// A state change for one job, carrying the post-transition snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub kind: JobEventKind,
    pub job: Job,
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(kind: JobEventKind, job: Job, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            job,
            timestamp,
        }
    }

    /// Event for a transition, timestamped with the job's `updated_at`.
    pub fn transition(job: Job) -> Self {
        let kind = JobEventKind::for_status(job.status);
        let timestamp = job.updated_at;
        Self::new(kind, job, timestamp)
    }

    pub fn job_id(&self) -> &str {
        &self.job.id
    }
}

/// Broadcasts every job event to feed subscribers.
#[derive(Clone)]
pub struct JobEventBroadcaster {
    sender: Arc<broadcast::Sender<JobEvent>>,
}

impl JobEventBroadcaster {
    /// Creates a broadcaster with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all feed subscribers.
    pub fn send(&self, event: JobEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    /// Creates a new feed subscriber.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobEventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
