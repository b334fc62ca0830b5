use std::path::Path;

use crate::config::schema::EngineConfig;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

pub fn validate_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.event_capacity == 0 {
        return Err(ConfigError::Validation {
            message: "event_capacity must be greater than 0".to_string(),
        });
    }

    if config.sweep_interval_secs == Some(0) {
        return Err(ConfigError::Validation {
            message: "sweep_interval_secs must be greater than 0 when set".to_string(),
        });
    }

    for (kind, steps) in &config.step_catalog {
        if kind.trim().is_empty() {
            return Err(ConfigError::InvalidCatalog {
                kind: kind.clone(),
                reason: "Conversion kind cannot be blank".to_string(),
            });
        }
        if steps.is_empty() {
            return Err(ConfigError::InvalidCatalog {
                kind: kind.clone(),
                reason: "At least one step is required".to_string(),
            });
        }
        if let Some(pos) = steps.iter().position(|s| s.trim().is_empty()) {
            return Err(ConfigError::InvalidCatalog {
                kind: kind.clone(),
                reason: format!("Step {} has a blank label", pos),
            });
        }
    }

    Ok(())
}
