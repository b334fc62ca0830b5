//! Test harness for isolated engine tests.
//!
//! Each harness owns its own engine, so tests never share jobs.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use convtrack::clock::ManualClock;
use convtrack::config::EngineConfig;
use convtrack::{JobEngine, JobEvent, Subscription};

/// Events captured by a recording subscription.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<JobEvent>>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn progress(&self) -> Vec<u8> {
        self.events()
            .iter()
            .map(|e| e.job.progress_percent)
            .collect()
    }
}

pub struct TestHarness {
    pub engine: JobEngine,
    pub clock: Arc<ManualClock>,
    temp_dir: Option<TempDir>,
}

impl TestHarness {
    /// Engine without timers on a manual clock.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::without_timers())
    }

    /// Must be called inside a tokio runtime when `config` enables timers.
    pub fn with_config(config: EngineConfig) -> Self {
        let clock = Arc::new(ManualClock::default());
        let engine = JobEngine::builder(config)
            .clock(clock.clone())
            .build()
            .expect("Failed to build engine");
        Self {
            engine,
            clock,
            temp_dir: None,
        }
    }

    /// Subscribes a recorder to `job_id`.
    pub fn record(&self, job_id: &str) -> (Recorder, Subscription) {
        let recorder = Recorder::default();
        let sink = Arc::clone(&recorder.events);
        let subscription = self
            .engine
            .subscribe(job_id, move |event| sink.lock().unwrap().push(event.clone()))
            .expect("Job should exist");
        (recorder, subscription)
    }

    pub fn advance_clock_ms(&self, ms: i64) {
        self.clock.advance(chrono::Duration::milliseconds(ms));
    }

    /// Writes `content` to a file in a temp directory owned by the harness.
    pub fn write_file(&mut self, name: &str, content: &str) -> PathBuf {
        let dir = self
            .temp_dir
            .get_or_insert_with(|| TempDir::new().expect("Failed to create temp directory"));
        let path = dir.path().join(name);
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
