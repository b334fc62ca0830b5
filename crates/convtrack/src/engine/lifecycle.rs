//! State transitions. Terminal states are absorbing:
//!
//! ```text
//! queued ──advance──▶ processing ──advance──▶ processing
//! queued | processing ──complete──▶ completed
//! queued | processing ──fail──────▶ failed
//! queued | processing ──cancel────▶ cancelled
//! ```
//!
//! Every transition against a terminal job is a silent no-op that returns the
//! job unchanged, so retried executor callbacks are idempotent and an
//! executor can see `cancelled` in the value `advance` hands back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::JobEngine;
use crate::broadcast::JobEvent;
use crate::job::{Extra, Job, JobResult, JobStatus, ProgressUpdate};
use crate::registry::JobEntry;

impl JobEngine {
    /// Creates a queued job positioned on the first catalog step of `kind`.
    pub fn create(&self, owner_id: &str, label: &str, kind: &str, extra: Option<Extra>) -> Job {
        let catalog = &self.inner.catalog;
        if !catalog.contains(kind) {
            log::debug!("Unknown conversion kind '{}', using default steps", kind);
        }

        let job = Job::new(
            Uuid::new_v4().to_string(),
            owner_id,
            label,
            kind,
            catalog.steps(kind),
            extra.unwrap_or_default(),
            self.inner.clock.now(),
        );
        let entry = Arc::new(JobEntry::new(job.clone()));
        entry.enqueue(JobEvent::transition(job.clone()));
        self.inner.registry.insert(Arc::clone(&entry));
        log::debug!(
            "Created job {} for owner {} ({}, {} steps)",
            job.id,
            owner_id,
            kind,
            job.total_steps
        );

        self.inner.flush(&entry);
        job
    }

    /// Records progress and moves the job to `processing`.
    ///
    /// Returns `None` for unknown jobs. The percentage is clamped to
    /// `0..=100` and never moves backwards.
    pub fn advance(&self, job_id: &str, update: ProgressUpdate) -> Option<Job> {
        let catalog = &self.inner.catalog;
        self.transition(job_id, "advance", move |job, now| {
            let resolved = catalog.position(&job.kind, &update.step_label);
            job.apply_progress(update, resolved, now);
        })
    }

    /// Marks the job completed, forces progress to 100 and records the
    /// processing time in the result. Schedules reclaim after the retention
    /// window.
    pub fn complete(&self, job_id: &str, result: Option<JobResult>) -> Option<Job> {
        self.transition(job_id, "complete", move |job, now| {
            job.mark_completed(result, now);
        })
    }

    /// Marks the job failed with `error_message`.
    pub fn fail(&self, job_id: &str, error_message: &str) -> Option<Job> {
        self.transition(job_id, "fail", |job, now| {
            job.mark_failed(error_message, now);
        })
    }

    /// Records a cancellation request. The executor is expected to notice the
    /// status and stop its own work.
    pub fn cancel(&self, job_id: &str) -> Option<Job> {
        self.transition(job_id, "cancel", |job, now| {
            job.mark_cancelled(now);
        })
    }

    /// Runs `apply` on a non-terminal job, queues the resulting event and
    /// delivers the job's queue. Returns `None` once the job was reclaimed,
    /// even if the caller looked it up before that.
    fn transition<F>(&self, job_id: &str, action: &str, apply: F) -> Option<Job>
    where
        F: FnOnce(&mut Job, DateTime<Utc>),
    {
        let Some(entry) = self.inner.registry.entry(job_id) else {
            log::debug!("Ignoring {} for unknown job {}", action, job_id);
            return None;
        };

        let job = {
            let mut state = entry.state();
            if entry.is_retired() {
                log::debug!("Ignoring {} for reclaimed job {}", action, job_id);
                return None;
            }
            if state.status.is_terminal() {
                log::debug!(
                    "Ignoring {} for job {} in terminal state {}",
                    action,
                    job_id,
                    state.status
                );
                return Some(state.clone());
            }

            apply(&mut *state, self.inner.clock.now());
            if state.status == JobStatus::Completed {
                // Scheduled under the state lock so a concurrent reclaim
                // either refuses this transition or cancels the timer.
                self.inner
                    .retention
                    .schedule(Arc::downgrade(&self.inner), job_id);
            }
            entry.enqueue(JobEvent::transition(state.clone()));
            state.clone()
        };

        log::debug!(
            "Job {} {} -> {} ({}%, step {}/{} '{}')",
            job_id,
            action,
            job.status,
            job.progress_percent,
            job.current_step_index + 1,
            job.total_steps,
            job.current_step_label
        );
        if job.status == JobStatus::Failed {
            log::info!(
                "Job {} failed: {}",
                job_id,
                job.error_message.as_deref().unwrap_or("unknown error")
            );
        }

        self.inner.flush(&entry);
        Some(job)
    }
}
