//! YAML configuration parsing.
//!
//! Parses scheduler configuration from YAML files.

use std::path::Path;

use super::error::ConfigError;
use super::types::SchedulerConfig;

/// YAML configuration loader.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load scheduler configuration from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<SchedulerConfig, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: SchedulerConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlFileError {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse scheduler configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<SchedulerConfig, ConfigError> {
        let config: SchedulerConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }
}
