//! Reclaiming terminal jobs: one-shot timers per completed job plus an
//! on-demand (and optionally periodic) age-based sweep.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::{EngineInner, JobEngine};

pub(crate) struct RetentionSweeper {
    runtime: Option<Handle>,
    window: Option<Duration>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
    periodic: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl RetentionSweeper {
    pub(crate) fn new(runtime: Option<Handle>, window: Option<Duration>) -> Self {
        Self {
            runtime,
            window,
            timers: Mutex::new(HashMap::new()),
            periodic: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.timers.lock().unwrap_or_else(|p| {
            log::warn!("Retention timer table lock was poisoned, recovering");
            p.into_inner()
        })
    }

    /// Schedules `job_id` for removal once the retention window elapses.
    pub(crate) fn schedule(&self, engine: Weak<EngineInner>, job_id: &str) {
        let (Some(runtime), Some(window)) = (&self.runtime, self.window) else {
            return;
        };
        if self.shut_down.load(Ordering::Acquire) {
            return;
        }

        // Held across spawn so the task cannot deregister before it is registered.
        let mut timers = self.timers();
        let id = job_id.to_string();
        let handle = runtime.spawn(async move {
            tokio::time::sleep(window).await;
            if let Some(inner) = engine.upgrade() {
                inner.retention.timers().remove(&id);
                if inner.reclaim(&id) {
                    log::info!("Retention window elapsed, reclaimed job {}", id);
                }
            }
        });

        if let Some(previous) = timers.insert(job_id.to_string(), handle) {
            previous.abort();
        }
        log::debug!("Scheduled reclaim of job {} in {:?}", job_id, window);
    }

    /// Aborts the pending timer for `job_id`, if any.
    pub(crate) fn cancel(&self, job_id: &str) -> bool {
        match self.timers().remove(job_id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.timers().len()
    }

    /// Runs `cleanup_older_than(max_age)` every `interval`.
    pub(crate) fn start_periodic(
        &self,
        engine: Weak<EngineInner>,
        interval: Duration,
        max_age: Duration,
    ) {
        let Some(runtime) = &self.runtime else {
            log::warn!("No runtime available, periodic sweep disabled");
            return;
        };

        let task = async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // skip immediate first tick

            loop {
                ticker.tick().await;
                let Some(inner) = engine.upgrade() else {
                    break;
                };
                let removed = JobEngine { inner }.cleanup_older_than(max_age);
                if removed > 0 {
                    log::info!("Periodic sweep reclaimed {} job(s)", removed);
                }
            }
        };

        let handle = runtime.spawn(task.instrument(tracing::info_span!("retention_sweep")));
        let mut periodic = self.periodic.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = periodic.replace(handle) {
            previous.abort();
        }
    }

    /// Aborts every timer and the periodic sweep; later `schedule` calls are ignored.
    pub(crate) fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        self.abort_all();
    }

    fn abort_all(&self) {
        let timers: Vec<(String, JoinHandle<()>)> = self.timers().drain().collect();
        for (_, handle) in &timers {
            handle.abort();
        }
        if !timers.is_empty() {
            log::debug!("Aborted {} pending reclaim timer(s)", timers.len());
        }

        let periodic = self
            .periodic
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(handle) = periodic {
            handle.abort();
        }
    }
}

impl Drop for RetentionSweeper {
    fn drop(&mut self) {
        self.abort_all();
    }
}

impl JobEngine {
    /// Removes every terminal job whose last update is at least `max_age`
    /// old. Returns how many jobs were removed. Safe to run concurrently with
    /// transitions and with the reclaim timers.
    pub fn cleanup_older_than(&self, max_age: Duration) -> usize {
        let now = self.inner.clock.now();
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);

        let expired: Vec<String> = self
            .inner
            .registry
            .snapshot_all()
            .into_iter()
            .filter(|job| job.is_terminal() && now - job.updated_at >= max_age)
            .map(|job| job.id)
            .collect();

        let removed = expired
            .iter()
            .filter(|id| self.inner.reclaim(id))
            .count();
        if removed > 0 {
            log::debug!("Sweep removed {} job(s) older than {:?}", removed, max_age);
        }
        removed
    }

    /// Removes a job immediately, whatever its state. Returns false if it
    /// was already gone.
    pub fn remove(&self, job_id: &str) -> bool {
        self.inner.reclaim(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use std::sync::Arc;

    fn engine_with_clock(config: EngineConfig) -> (JobEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let engine = JobEngine::builder(config)
            .clock(clock.clone())
            .build()
            .unwrap();
        (engine, clock)
    }

    #[test]
    fn test_cleanup_zero_removes_all_terminal_jobs() {
        let (engine, _clock) = engine_with_clock(EngineConfig::without_timers());
        let done = engine.create("u", "a.pdf", "PDF_TO_WORD", None);
        let failed = engine.create("u", "b.pdf", "PDF_TO_WORD", None);
        let cancelled = engine.create("u", "c.pdf", "PDF_TO_WORD", None);
        let active = engine.create("u", "d.pdf", "PDF_TO_WORD", None);
        engine.complete(&done.id, None);
        engine.fail(&failed.id, "boom");
        engine.cancel(&cancelled.id);

        assert_eq!(engine.cleanup_older_than(Duration::ZERO), 3);
        assert_eq!(engine.len(), 1);
        assert!(engine.get(&active.id).is_some());
        assert_eq!(engine.cleanup_older_than(Duration::ZERO), 0);
    }

    #[test]
    fn test_cleanup_respects_age() {
        let (engine, clock) = engine_with_clock(EngineConfig::without_timers());
        let old = engine.create("u", "old.pdf", "PDF_TO_WORD", None);
        engine.fail(&old.id, "boom");

        clock.advance(chrono::Duration::minutes(30));
        let recent = engine.create("u", "new.pdf", "PDF_TO_WORD", None);
        engine.fail(&recent.id, "boom");

        clock.advance(chrono::Duration::minutes(31));
        assert_eq!(engine.cleanup_older_than(Duration::from_secs(3600)), 1);
        assert!(engine.get(&old.id).is_none());
        assert!(engine.get(&recent.id).is_some());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (engine, _clock) = engine_with_clock(EngineConfig::without_timers());
        let job = engine.create("u", "a.pdf", "PDF_TO_WORD", None);
        assert!(engine.remove(&job.id));
        assert!(!engine.remove(&job.id));
        assert!(engine.list_by_owner("u").is_empty());
    }

    #[test]
    fn test_without_runtime_fails_when_timers_enabled() {
        let result = JobEngine::new(EngineConfig::default());
        assert!(matches!(
            result,
            Err(crate::error::ConvtrackError::Engine(
                crate::error::EngineError::RuntimeUnavailable
            ))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_job_reclaimed_after_window() {
        let engine = JobEngine::new(EngineConfig::default()).unwrap();
        let job = engine.create("u", "a.pdf", "PDF_TO_WORD", None);
        engine.complete(&job.id, None);
        assert_eq!(engine.pending_reclaims(), 1);

        tokio::time::sleep(Duration::from_secs(3599)).await;
        assert!(engine.get(&job.id).is_some());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(engine.get(&job.id).is_none());
        assert_eq!(engine.pending_reclaims(), 0);
        assert!(engine.list_by_owner("u").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_cancels_pending_timer() {
        let engine = JobEngine::new(EngineConfig::default()).unwrap();
        let job = engine.create("u", "a.pdf", "PDF_TO_WORD", None);
        engine.complete(&job.id, None);

        assert_eq!(engine.cleanup_older_than(Duration::ZERO), 1);
        assert_eq!(engine.pending_reclaims(), 0);

        tokio::time::sleep(Duration::from_secs(7200)).await;
        assert!(engine.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_timers() {
        let engine = JobEngine::new(EngineConfig::default()).unwrap();
        let first = engine.create("u", "a.pdf", "PDF_TO_WORD", None);
        engine.complete(&first.id, None);

        engine.shutdown();
        assert_eq!(engine.pending_reclaims(), 0);

        let second = engine.create("u", "b.pdf", "PDF_TO_WORD", None);
        engine.complete(&second.id, None);
        assert_eq!(engine.pending_reclaims(), 0);

        tokio::time::sleep(Duration::from_secs(7200)).await;
        assert_eq!(engine.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_sweep() {
        let config = EngineConfig {
            retention_window_secs: None,
            sweep_interval_secs: Some(60),
            sweep_max_age_secs: 0,
            ..EngineConfig::default()
        };
        let engine = JobEngine::new(config).unwrap();
        let job = engine.create("u", "a.pdf", "PDF_TO_WORD", None);
        engine.fail(&job.id, "boom");

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(engine.get(&job.id).is_none());
    }
}
