//! The job engine: lifecycle transitions, retention and queries over one
//! registry and one notification hub.
//!
//! Construct one engine per process and share it by cloning; clones are
//! handles to the same state.

mod lifecycle;
mod query;
mod retention;

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::broadcast;

use crate::broadcast::{JobEvent, JobEventKind, NotificationHub, Subscription};
use crate::catalog::StepCatalog;
use crate::clock::{Clock, SystemClock};
use crate::config::{validate_config, EngineConfig};
use crate::error::{EngineError, Result};
use crate::job::Job;
use crate::registry::{JobEntry, JobRegistry};

pub use query::{estimate_remaining, JobStats};
use retention::RetentionSweeper;

pub(crate) struct EngineInner {
    registry: JobRegistry,
    hub: NotificationHub,
    catalog: StepCatalog,
    clock: Arc<dyn Clock>,
    retention: RetentionSweeper,
}

impl EngineInner {
    /// Drops a job from the registry, the hub and the timer table.
    /// Returns false if it was already gone.
    ///
    /// The `Removed` event joins the entry's queue behind any transition
    /// already in flight, and later transitions on the detached entry are
    /// refused, so the feed never reports a job after its removal.
    fn reclaim(&self, job_id: &str) -> bool {
        let Some(entry) = self.registry.take(job_id) else {
            self.retention.cancel(job_id);
            return false;
        };

        let job = {
            let state = entry.state();
            entry.retire();
            entry.enqueue(JobEvent::new(
                JobEventKind::Removed,
                state.clone(),
                self.clock.now(),
            ));
            state.clone()
        };
        self.retention.cancel(job_id);
        let listeners = self.hub.remove_job(job_id);
        log::debug!(
            "Reclaimed job {} ({}) and {} listener(s)",
            job_id,
            job.status,
            listeners
        );

        self.flush(&entry);
        true
    }

    /// Delivers the entry's queued events.
    fn flush(&self, entry: &JobEntry) {
        entry.drain(|event| {
            if event.kind == JobEventKind::Removed {
                self.hub.announce(event.clone());
            } else {
                self.hub.publish(event);
            }
        });
    }
}

/// Builder for [`JobEngine`].
pub struct EngineBuilder {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    runtime: Option<Handle>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            runtime: None,
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Runtime used for reclaim timers. Defaults to the current runtime.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn build(self) -> Result<JobEngine> {
        validate_config(&self.config)?;

        let runtime = match self.runtime {
            Some(handle) => Some(handle),
            None if self.config.needs_runtime() => {
                Some(Handle::try_current().map_err(|_| EngineError::RuntimeUnavailable)?)
            }
            None => None,
        };

        let inner = Arc::new(EngineInner {
            registry: JobRegistry::new(),
            hub: NotificationHub::new(self.config.event_capacity),
            catalog: StepCatalog::with_overrides(&self.config.step_catalog),
            clock: self.clock,
            retention: RetentionSweeper::new(runtime, self.config.retention_window()),
        });

        if let Some(interval) = self.config.sweep_interval() {
            inner.retention.start_periodic(
                Arc::downgrade(&inner),
                interval,
                self.config.sweep_max_age(),
            );
        }

        log::info!(
            "Job engine started (retention: {:?}, sweep interval: {:?})",
            self.config.retention_window(),
            self.config.sweep_interval()
        );

        Ok(JobEngine { inner })
    }
}

/// Tracks conversion jobs from creation to reclamation.
#[derive(Clone)]
pub struct JobEngine {
    inner: Arc<EngineInner>,
}

impl JobEngine {
    /// Builds an engine on the current tokio runtime with the system clock.
    pub fn new(config: EngineConfig) -> Result<Self> {
        EngineBuilder::new(config).build()
    }

    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Snapshot of a job.
    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.inner.registry.get(job_id)
    }

    /// Registers `callback` for every subsequent state change of `job_id`.
    /// Returns `None` if the job is unknown.
    pub fn subscribe<F>(&self, job_id: &str, callback: F) -> Option<Subscription>
    where
        F: Fn(&JobEvent) + Send + Sync + 'static,
    {
        if !self.inner.registry.contains(job_id) {
            return None;
        }
        let subscription = self.inner.hub.subscribe(job_id, callback);
        // Reclaimed between the check and the insert.
        if !self.inner.registry.contains(job_id) {
            drop(subscription);
            return None;
        }
        Some(subscription)
    }

    /// Stream of every event of every job, including removals.
    pub fn events(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.hub.feed()
    }

    pub fn catalog(&self) -> &StepCatalog {
        &self.inner.catalog
    }

    /// Number of jobs currently held.
    pub fn len(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.registry.is_empty()
    }

    /// Number of scheduled reclaim timers that have not fired yet.
    pub fn pending_reclaims(&self) -> usize {
        self.inner.retention.pending()
    }

    pub fn subscriber_count(&self, job_id: &str) -> usize {
        self.inner.hub.subscriber_count(job_id)
    }

    /// Aborts every pending reclaim timer and the background sweep. Later
    /// completions are not scheduled for reclaim.
    pub fn shutdown(&self) {
        self.inner.retention.shutdown();
        log::info!("Job engine shut down");
    }
}
