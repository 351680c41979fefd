//! Configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

/// Tunables shared by every model of a registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Lifetime of a table lock; a crashed holder blocks others at most this long.
    pub lock_ttl: Duration,
    /// Fixed sleep between lock polls.
    pub lock_poll_interval: Duration,
    /// Give up waiting for a lock after this long. `None` waits until the lock frees.
    pub max_lock_wait: Option<Duration>,
    /// Expiry of a cached id list.
    pub list_key_ttl: Duration,
    /// Maximum number of ids cached per list key (one large-page window).
    pub large_limit: u64,
    /// Page size used when a list request carries no limit.
    pub default_page_size: u64,
    /// Whether `register` creates declared indexes. Only one worker should.
    pub init_indexes: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(10),
            lock_poll_interval: Duration::from_millis(20),
            max_lock_wait: None,
            list_key_ttl: Duration::from_secs(60),
            large_limit: 2_000,
            default_page_size: 20,
            init_indexes: true,
        }
    }
}

impl ModelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create ModelConfig from environment variables.
    ///
    /// Environment variables:
    /// - `TESSERA_LOCK_TTL_MS`: lock lifetime (default: 10000)
    /// - `TESSERA_LOCK_POLL_MS`: poll interval on contention (default: 20)
    /// - `TESSERA_MAX_LOCK_WAIT_MS`: give-up threshold (default: unset, wait forever)
    /// - `TESSERA_LIST_KEY_TTL_SECS`: cached list expiry (default: 60)
    /// - `TESSERA_LARGE_LIMIT`: ids per cached window (default: 2000)
    /// - `TESSERA_DEFAULT_PAGE_SIZE`: page size (default: 20)
    /// - `TESSERA_INIT_INDEXES`: "true" or "false" (default: true)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            lock_ttl: env_u64("TESSERA_LOCK_TTL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_ttl),
            lock_poll_interval: env_u64("TESSERA_LOCK_POLL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_poll_interval),
            max_lock_wait: env_u64("TESSERA_MAX_LOCK_WAIT_MS")?.map(Duration::from_millis),
            list_key_ttl: env_u64("TESSERA_LIST_KEY_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.list_key_ttl),
            large_limit: env_u64("TESSERA_LARGE_LIMIT")?.unwrap_or(defaults.large_limit),
            default_page_size: env_u64("TESSERA_DEFAULT_PAGE_SIZE")?
                .unwrap_or(defaults.default_page_size),
            init_indexes: std::env::var("TESSERA_INIT_INDEXES")
                .ok()
                .map(|s| s.to_lowercase() != "false")
                .unwrap_or(defaults.init_indexes),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.lock_poll_interval = interval;
        self
    }

    pub fn with_max_lock_wait(mut self, wait: Option<Duration>) -> Self {
        self.max_lock_wait = wait;
        self
    }

    pub fn with_list_key_ttl(mut self, ttl: Duration) -> Self {
        self.list_key_ttl = ttl;
        self
    }

    pub fn with_large_limit(mut self, large_limit: u64) -> Self {
        self.large_limit = large_limit;
        self
    }

    pub fn with_default_page_size(mut self, size: u64) -> Self {
        self.default_page_size = size;
        self
    }

    pub fn with_init_indexes(mut self, enabled: bool) -> Self {
        self.init_indexes = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock_ttl.is_zero() {
            return Err(invalid("lock_ttl", "0", "lock ttl must be positive"));
        }
        if self.lock_poll_interval >= self.lock_ttl {
            return Err(invalid(
                "lock_poll_interval",
                &format!("{:?}", self.lock_poll_interval),
                "poll interval must be shorter than the lock ttl",
            ));
        }
        if self.list_key_ttl.as_secs() == 0 {
            return Err(invalid(
                "list_key_ttl",
                &format!("{:?}", self.list_key_ttl),
                "list key ttl must be at least one second",
            ));
        }
        if self.large_limit == 0 {
            return Err(invalid("large_limit", "0", "must be positive"));
        }
        if self.default_page_size == 0 || self.default_page_size > self.large_limit {
            return Err(invalid(
                "default_page_size",
                &self.default_page_size.to_string(),
                "must be between 1 and large_limit",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: std::num::ParseIntError| invalid(name, &raw, &e.to_string())),
        Err(_) => Ok(None),
    }
}
