//! Executor-facing handles for reporting progress on a single job.

use crate::engine::JobEngine;
use crate::job::{Extra, Job, JobResult, JobStatus, ProgressUpdate};

/// Events an executor emits while converting a file.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Progress(ProgressUpdate),
    Completed(Option<JobResult>),
    Failed { error: String },
}

/// Sink for executor progress. Conversion engines take `&dyn ProgressReporter`
/// so they can run with or without a tracked job.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);

    /// Whether the executor should stop cooperatively.
    fn should_abort(&self) -> bool {
        false
    }
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Tracks progress for one job on behalf of an executor.
#[derive(Clone)]
pub struct JobTracker {
    engine: JobEngine,
    job_id: String,
}

impl JobTracker {
    pub fn new(engine: JobEngine, job_id: impl Into<String>) -> Self {
        Self {
            engine,
            job_id: job_id.into(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Reports a percentage and step label.
    pub fn advance(&self, progress_percent: i64, step_label: &str) -> Option<Job> {
        self.report_update(ProgressUpdate::new(progress_percent, step_label))
    }

    pub fn report_update(&self, update: ProgressUpdate) -> Option<Job> {
        self.engine.advance(&self.job_id, update)
    }

    /// Moves to catalog step `index`, with progress proportional to the
    /// steps already finished.
    pub fn step(&self, index: usize) -> Option<Job> {
        let job = self.engine.get(&self.job_id)?;
        let steps = self.engine.catalog().steps(&job.kind);
        let index = index.min(steps.len().saturating_sub(1));
        let percent = (index * 100 / steps.len().max(1)) as i64;

        self.report_update(ProgressUpdate::new(percent, steps[index].clone()).with_step_index(index))
    }

    /// Merges `extra` into the job without moving progress backwards.
    pub fn annotate(&self, extra: Extra) -> Option<Job> {
        let job = self.engine.get(&self.job_id)?;
        self.report_update(
            ProgressUpdate::new(i64::from(job.progress_percent), job.current_step_label)
                .with_step_index(job.current_step_index)
                .with_extra(extra),
        )
    }

    pub fn complete(&self, result: Option<JobResult>) -> Option<Job> {
        self.engine.complete(&self.job_id, result)
    }

    pub fn fail(&self, error: &str) -> Option<Job> {
        self.engine.fail(&self.job_id, error)
    }

    pub fn status(&self) -> Option<JobStatus> {
        self.engine.get(&self.job_id).map(|job| job.status)
    }

    /// True once the job was cancelled or reclaimed.
    pub fn is_cancelled(&self) -> bool {
        !matches!(
            self.status(),
            Some(JobStatus::Queued | JobStatus::Processing | JobStatus::Completed | JobStatus::Failed)
        )
    }

    pub fn snapshot(&self) -> Option<Job> {
        self.engine.get(&self.job_id)
    }
}

impl ProgressReporter for JobTracker {
    fn report(&self, event: ProgressEvent) {
        let outcome = match event {
            ProgressEvent::Progress(update) => self.report_update(update),
            ProgressEvent::Completed(result) => self.complete(result),
            ProgressEvent::Failed { error } => self.fail(&error),
        };
        if outcome.is_none() {
            log::debug!("Progress for job {} dropped, job no longer tracked", self.job_id);
        }
    }

    fn should_abort(&self) -> bool {
        self.is_cancelled()
    }
}

impl JobEngine {
    /// Creates a job and returns a tracker bound to it.
    pub fn start_job(
        &self,
        owner_id: &str,
        label: &str,
        kind: &str,
        extra: Option<Extra>,
    ) -> JobTracker {
        let job = self.create(owner_id, label, kind, extra);
        JobTracker::new(self.clone(), job.id)
    }
}
