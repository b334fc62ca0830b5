use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvtrackError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid step catalog entry '{kind}': {reason}")]
    InvalidCatalog { kind: String, reason: String },
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Retention timers are enabled but no tokio runtime is available")]
    RuntimeUnavailable,
}

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ConvtrackError>;
