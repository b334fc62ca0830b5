use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Delay before a completed job is reclaimed. `null` keeps jobs forever.
    #[serde(default = "default_retention_window_secs")]
    pub retention_window_secs: Option<u64>,
    /// Interval of the background sweep. `null` disables it.
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,
    /// Age past which the background sweep reclaims terminal jobs.
    #[serde(default = "default_sweep_max_age_secs")]
    pub sweep_max_age_secs: u64,
    /// Buffer size of the engine-wide event feed.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Extra or overriding step catalog entries, keyed by conversion kind.
    #[serde(default)]
    pub step_catalog: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_retention_window_secs() -> Option<u64> {
    Some(3600)
}

fn default_sweep_max_age_secs() -> u64 {
    3600
}

fn default_event_capacity() -> usize {
    256
}

impl EngineConfig {
    pub fn retention_window(&self) -> Option<Duration> {
        self.retention_window_secs.map(Duration::from_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_secs.map(Duration::from_secs)
    }

    pub fn sweep_max_age(&self) -> Duration {
        Duration::from_secs(self.sweep_max_age_secs)
    }

    /// True when the engine needs a tokio runtime for timers.
    pub fn needs_runtime(&self) -> bool {
        self.retention_window_secs.is_some() || self.sweep_interval_secs.is_some()
    }

    /// Configuration with every background timer switched off.
    pub fn without_timers() -> Self {
        Self {
            retention_window_secs: None,
            sweep_interval_secs: None,
            ..Self::default()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retention_window_secs: default_retention_window_secs(),
            sweep_interval_secs: None,
            sweep_max_age_secs: default_sweep_max_age_secs(),
            event_capacity: default_event_capacity(),
            step_catalog: HashMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `convtrack=debug`.
    #[serde(default = "default_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}
