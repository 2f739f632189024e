// Tue Jan 13 2026 - Alex

use crate::utils::logging::LoggingUtils;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Where task bodies run when no executor is set on the builder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    #[default]
    Pool,
    Rayon,
    ThreadPerTask,
    Inline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub worker_threads: usize,
    pub thread_name_prefix: String,
    pub executor: ExecutorKind,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
            thread_name_prefix: "seqtask-worker".to_string(),
            executor: ExecutorKind::Pool,
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: &str) -> Self {
        self.thread_name_prefix = prefix.to_string();
        self
    }

    pub fn with_executor(mut self, executor: ExecutorKind) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_log_level(mut self, level: &str) -> Self {
        self.log_level = level.to_string();
        self
    }

    /// Level filter for `LoggingUtils::init_logger` at the entry point.
    pub fn log_filter(&self) -> Result<log::LevelFilter, ConfigError> {
        LoggingUtils::level_from_str(&self.log_level).ok_or_else(|| ConfigError::InvalidValue {
            field: "log_level",
            reason: format!("unknown level {:?}", self.log_level),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_threads == 0 {
            return Err(ConfigError::InvalidValue {
                field: "worker_threads",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.thread_name_prefix.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "thread_name_prefix",
                reason: "must not be empty".to_string(),
            });
        }

        self.log_filter()?;
        Ok(())
    }
}
