//! Process-wide log subscriber installation.
//!
//! The library logs through the `log` facade. `init_logging` routes those
//! records into a `tracing` subscriber so host applications get one stream.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::config::LoggingConfig;
use crate::error::LoggingError;

/// Installs the global subscriber. Returns `Ok(false)` if one was already set.
pub fn init_logging(config: &LoggingConfig) -> Result<bool, LoggingError> {
    let filter = build_filter(&config.level)?;

    let installed = if config.json {
        Registry::default()
            .with(filter)
            .with(fmt::layer().json().with_target(true))
            .try_init()
            .is_ok()
    } else {
        Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init()
            .is_ok()
    };

    if !installed {
        return Ok(false);
    }

    // tracing-subscriber is built without its `tracing-log` feature, so this
    // is the only bridge. It fails if the host already set a `log` logger.
    if let Err(e) = tracing_log::LogTracer::init() {
        tracing::warn!("log records will not reach the subscriber: {}", e);
    }

    log::info!("Logging initialized at level '{}'", config.level);
    Ok(true)
}

/// Parses an `EnvFilter` directive, preferring `RUST_LOG` when it is set.
pub fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|e| LoggingError::InvalidFilter {
        filter: level.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_accepts_directives() {
        assert!(build_filter("info").is_ok());
        assert!(build_filter("convtrack=debug,warn").is_ok());
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        let config = LoggingConfig::default();
        let _ = init_logging(&config).unwrap();
        assert!(!init_logging(&config).unwrap());
        // The `log` bridge is installed exactly once, by whichever call won.
        assert_ne!(log::max_level(), log::LevelFilter::Off);
        assert!(tracing_log::LogTracer::init().is_err());
    }
}
