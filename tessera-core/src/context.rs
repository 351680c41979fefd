//! Explicit context handed to every model at construction.

use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::ConfigError;

/// How verbosely models report the queries they issue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPolicy {
    /// Log every query descriptor at debug level instead of trace.
    pub log_queries: bool,
}

impl LogPolicy {
    /// Reads `TESSERA_LOG_QUERIES` ("true"/"1" enables).
    pub fn from_env() -> Self {
        let log_queries = std::env::var("TESSERA_LOG_QUERIES")
            .map(|s| matches!(s.to_lowercase().as_str(), "true" | "1"))
            .unwrap_or(false);
        Self { log_queries }
    }
}

/// Configuration plus logging policy shared by a registry's models.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelContext {
    pub config: ModelConfig,
    pub log: LogPolicy,
}

impl ModelContext {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            log: LogPolicy::default(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            config: ModelConfig::from_env()?,
            log: LogPolicy::from_env(),
        })
    }

    pub fn with_log_policy(mut self, log: LogPolicy) -> Self {
        self.log = log;
        self
    }
}
