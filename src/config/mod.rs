//! Configuration loading and parsing.
//!
//! This module provides YAML-based configuration for the scheduler.

mod error;
mod types;
mod yaml;

pub use error::ConfigError;
pub use types::SchedulerConfig;
pub use yaml::ConfigLoader;
