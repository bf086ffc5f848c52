//! Pipeline configuration
//!
//! Every field has a default, so an empty TOML file is a valid config:
//!
//! ```toml
//! failure_policy = "fail_fast"
//! run_timeout_secs = 600
//!
//! [limiter]
//! max_concurrent = 4
//! max_retries = 2
//! base_delay_ms = 500
//! max_delay_ms = 8000
//!
//! [cache]
//! strict = true
//! backend = { kind = "bounded", capacity = 10000 }
//!
//! [sectioner]
//! max_section_bytes = 24000
//!
//! [validator]
//! overlap_threshold = 0.8
//! ```

use crate::error::ConfigError;
use crate::limiter::LimiterConfig;
use muse_ingest::{CacheConfig, SectionerConfig};
use muse_validate::ValidatorConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How sibling failures within a fan-out stage combine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// First failure cancels the siblings and ends the run
    #[default]
    FailFast,
    /// Let siblings finish, then report every failure
    CollectAll,
}

/// Pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub failure_policy: FailurePolicy,
    /// Deadline for a whole run
    pub run_timeout_secs: Option<u64>,
    pub limiter: LimiterConfig,
    pub cache: CacheConfig,
    pub sectioner: SectionerConfig,
    pub validator: ValidatorConfig,
}

impl PipelineConfig {
    /// Create config with defaults
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set limiter settings
    #[must_use]
    pub fn with_limiter(mut self, limiter: LimiterConfig) -> Self {
        self.limiter = limiter;
        self
    }

    /// Set concurrency ceiling
    #[must_use]
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.limiter.max_concurrent = max;
        self
    }

    /// Set cache settings
    #[must_use]
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Set validator thresholds
    #[must_use]
    pub fn with_validator(mut self, validator: ValidatorConfig) -> Self {
        self.validator = validator;
        self
    }

    /// Set failure policy
    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Set run deadline (whole seconds)
    #[must_use]
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    /// Run deadline, if any
    #[must_use]
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// [`ConfigError::Parse`] on bad TOML, [`ConfigError::Invalid`] on
    /// inconsistent values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    ///
    /// # Errors
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Render as TOML
    ///
    /// # Errors
    /// [`ConfigError::Serialize`] if a value cannot be represented.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values that parse but cannot work
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.limiter.max_concurrent == 0 {
            return invalid("limiter.max_concurrent must be at least 1");
        }
        if self.limiter.base_delay_ms > self.limiter.max_delay_ms {
            return invalid("limiter.base_delay_ms exceeds limiter.max_delay_ms");
        }
        if self.limiter.tokens_per_minute == Some(0) {
            return invalid("limiter.tokens_per_minute must be positive");
        }
        if self.sectioner.max_section_bytes < 64 {
            return invalid("sectioner.max_section_bytes must be at least 64");
        }
        let threshold = self.validator.overlap_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return invalid("validator.overlap_threshold must be in (0, 1]");
        }
        if self.run_timeout_secs == Some(0) {
            return invalid("run_timeout_secs must be positive");
        }
        Ok(())
    }
}
