// Configuration module

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::cache::{CacheModel, CacheOptions};
use crate::constants::{
    DEFAULT_LOG_LEVEL, DEFAULT_STALE_WHILE_REVALIDATE, DEFAULT_STORAGE_DIRECTORY, MB,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Environment variable '{0}' is referenced but not set")]
    MissingEnvVar(String),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_storage_directory")]
    pub storage_directory: PathBuf,
    #[serde(default)]
    pub cache_model: CacheModel,
    #[serde(default)]
    pub testing_mode: bool,
    #[serde(default)]
    pub speculative_revalidation: bool,
    #[serde(default = "default_stale_while_revalidate")]
    pub stale_while_revalidate: bool,
    /// Fixed capacity instead of one computed from free disk space
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_override_mb: Option<u64>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_storage_directory() -> PathBuf {
    PathBuf::from(DEFAULT_STORAGE_DIRECTORY)
}

fn default_stale_while_revalidate() -> bool {
    DEFAULT_STALE_WHILE_REVALIDATE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_directory: default_storage_directory(),
            cache_model: CacheModel::default(),
            testing_mode: false,
            speculative_revalidation: false,
            stale_while_revalidate: default_stale_while_revalidate(),
            capacity_override_mb: None,
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.level.trim().is_empty() {
            return Err("logging.level cannot be empty".to_string());
        }
        Ok(())
    }
}

impl Config {
    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, ConfigError> {
        // Replace ${VAR_NAME} with environment variable values
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let mut missing = None;
        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            let var_name = &caps[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    missing.get_or_insert_with(|| var_name.to_string());
                    String::new()
                }
            }
        });
        if let Some(var_name) = missing {
            return Err(ConfigError::MissingEnvVar(var_name));
        }

        Ok(serde_yaml::from_str(&substituted)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_with_env(&yaml)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.storage_directory.as_os_str().is_empty() {
            return Err("storage_directory cannot be empty".to_string());
        }
        self.logging.validate()
    }

    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            testing_mode: self.testing_mode,
            speculative_revalidation: self.speculative_revalidation,
            capacity_override: self.capacity_override_mb.map(|mb| mb * MB),
        }
    }
}
