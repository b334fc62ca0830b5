//! Builder patterns for creating test data programmatically.

#![allow(dead_code)]

use std::collections::HashMap;

use convtrack::config::{EngineConfig, LoggingConfig};

/// Builder for creating `EngineConfig` instances.
pub struct ConfigBuilder {
    retention_window_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
    sweep_max_age_secs: u64,
    event_capacity: usize,
    step_catalog: HashMap<String, Vec<String>>,
    logging: LoggingConfig,
}

impl ConfigBuilder {
    /// Create a new builder with timers disabled.
    pub fn new() -> Self {
        Self {
            retention_window_secs: None,
            sweep_interval_secs: None,
            sweep_max_age_secs: 3600,
            event_capacity: 64,
            step_catalog: HashMap::new(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn retention_window_secs(mut self, secs: u64) -> Self {
        self.retention_window_secs = Some(secs);
        self
    }

    pub fn sweep(mut self, interval_secs: u64, max_age_secs: u64) -> Self {
        self.sweep_interval_secs = Some(interval_secs);
        self.sweep_max_age_secs = max_age_secs;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Add or override the steps of a conversion kind.
    pub fn kind(mut self, kind: &str, steps: &[&str]) -> Self {
        self.step_catalog.insert(
            kind.to_string(),
            steps.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn build(self) -> EngineConfig {
        EngineConfig {
            retention_window_secs: self.retention_window_secs,
            sweep_interval_secs: self.sweep_interval_secs,
            sweep_max_age_secs: self.sweep_max_age_secs,
            event_capacity: self.event_capacity,
            step_catalog: self.step_catalog,
            logging: self.logging,
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
