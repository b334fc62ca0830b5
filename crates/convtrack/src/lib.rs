pub mod broadcast;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod job;
pub mod logging;
pub mod registry;

pub use broadcast::{JobEvent, JobEventBroadcaster, JobEventKind, NotificationHub, Subscription};
pub use catalog::StepCatalog;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_config, load_config_from_str, EngineConfig, LoggingConfig};
pub use engine::{estimate_remaining, EngineBuilder, JobEngine, JobStats};
pub use error::{ConfigError, ConvtrackError, EngineError, LoggingError, Result};
pub use executor::{JobTracker, NoopProgress, ProgressEvent, ProgressReporter};
pub use job::{Extra, Job, JobResult, JobStatus, ProgressUpdate};
pub use logging::init_logging;
pub use registry::JobRegistry;
