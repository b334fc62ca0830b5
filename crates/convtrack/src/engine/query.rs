//! Read-only views over the registry.

use serde::Serialize;

use super::JobEngine;
use crate::job::{Job, JobStatus};

/// Job counts per status plus the mean processing time of completed jobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStats {
    pub total: usize,
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Mean over completed jobs that carry a processing time; 0 when none do.
    pub average_processing_time_ms: u64,
}

impl JobStats {
    fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        let mut stats = JobStats::default();
        let mut timed = 0u64;
        let mut total_time_ms = 0u64;

        for job in jobs {
            stats.total += 1;
            match job.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }

            if job.status == JobStatus::Completed {
                if let Some(ms) = job.result.as_ref().and_then(|r| r.processing_time_ms) {
                    timed += 1;
                    total_time_ms = total_time_ms.saturating_add(ms);
                }
            }
        }

        if timed > 0 {
            stats.average_processing_time_ms =
                (total_time_ms as f64 / timed as f64).round() as u64;
        }
        stats
    }

    /// Jobs still queued or processing.
    pub fn active(&self) -> usize {
        self.queued + self.processing
    }
}

/// Estimated milliseconds until completion from the progress made so far.
///
/// `None` when no progress has been made. Linear extrapolation, floored at 0.
pub fn estimate_remaining(progress_percent: i64, elapsed_ms: u64) -> Option<u64> {
    if progress_percent <= 0 {
        return None;
    }
    let elapsed = elapsed_ms as f64;
    let remaining = elapsed * 100.0 / progress_percent as f64 - elapsed;
    Some(remaining.round().max(0.0) as u64)
}

impl JobEngine {
    /// Jobs of `owner_id`, newest first.
    pub fn list_by_owner(&self, owner_id: &str) -> Vec<Job> {
        let mut jobs = self.inner.registry.list_by_owner(owner_id);
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        jobs
    }

    /// Queued or processing jobs of `owner_id`, newest first.
    pub fn list_active_by_owner(&self, owner_id: &str) -> Vec<Job> {
        let mut jobs = self.list_by_owner(owner_id);
        jobs.retain(Job::is_active);
        jobs
    }

    /// The `limit` newest jobs of `owner_id`.
    pub fn list_recent_by_owner(&self, owner_id: &str, limit: usize) -> Vec<Job> {
        let mut jobs = self.list_by_owner(owner_id);
        jobs.truncate(limit);
        jobs
    }

    /// Counts for one owner, or for every job when `owner_id` is `None`.
    pub fn aggregate_stats(&self, owner_id: Option<&str>) -> JobStats {
        let jobs = match owner_id {
            Some(owner) => self.inner.registry.list_by_owner(owner),
            None => self.inner.registry.snapshot_all(),
        };
        JobStats::from_jobs(&jobs)
    }

    /// Remaining-time estimate for a stored job. `None` for unknown,
    /// terminal or not-yet-started jobs.
    pub fn estimate_remaining_for(&self, job_id: &str) -> Option<u64> {
        let job = self.get(job_id)?;
        if job.is_terminal() {
            return None;
        }
        let elapsed = job.elapsed_ms(self.inner.clock.now());
        estimate_remaining(i64::from(job.progress_percent), elapsed)
    }
}
