//! Error types for the Muse pipeline
//!
//! Layered the way failures travel upward:
//! - [`ServiceError`]: one reasoning call failed, tagged retryable or fatal
//! - [`CallError`]: the rate limiter gave up on a call
//! - [`StageError`]: a summarization or derivation stage gave up on one input
//! - [`PipelineError`]: the terminal error handed to the caller

use muse_artifact::{Stage, ValidationResult};
use muse_ingest::{CacheError, InputError};
use std::path::PathBuf;
use std::time::Duration;

/// Failure reported by the reasoning service
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Service asked us to slow down
    #[error("throttled by reasoning service")]
    Throttled {
        /// Server-suggested wait before the next attempt
        retry_after: Option<Duration>,
    },

    /// Network or availability fault
    #[error("transient service fault: {0}")]
    Transient(String),

    /// Output could not be parsed into the expected shape
    #[error("malformed service output: {0}")]
    Malformed(String),

    /// Service refused the request outright
    #[error("request rejected by service: {0}")]
    Rejected(String),
}

impl ServiceError {
    /// Whether the rate limiter may retry this call
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled { .. } | Self::Transient(_))
    }

    /// Server-suggested delay, if any
    #[inline]
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Throttled { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// A call through the rate limiter did not produce a value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// Cancelled while queued, running or backing off
    #[error("call cancelled")]
    Cancelled,

    /// Retryable failures persisted past the retry ceiling
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made, including the first
        attempts: u32,
        /// Error from the final attempt
        #[source]
        last: ServiceError,
    },

    /// Non-retryable service failure
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl CallError {
    /// Whether a derivation stage should spend its one retry on this error
    #[inline]
    #[must_use]
    pub fn is_stage_retryable(&self) -> bool {
        matches!(self, Self::Service(e) if !e.is_retryable())
    }
}

/// A stage gave up on one input (a section, the summary set, an epic or a feature)
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// Run was cancelled
    #[error("cancelled")]
    Cancelled,

    /// Reasoning call failed
    #[error("reasoning call failed: {0}")]
    Call(CallError),

    /// Output failed validation on every attempt
    #[error("output rejected after {attempts} attempt(s): {result}")]
    Rejected {
        /// Attempts made
        attempts: u8,
        /// Issues from the final attempt
        result: ValidationResult,
    },

    /// Summary cache invariant broken
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl From<CallError> for StageError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Cancelled => Self::Cancelled,
            other => Self::Call(other),
        }
    }
}

impl StageError {
    /// Check if the stage stopped because of cancellation
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Configuration could not be loaded
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that was read
        path: PathBuf,
        /// Underlying read error
        #[source]
        source: std::io::Error,
    },

    /// TOML did not match the schema
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config could not be rendered
    #[error("failed to render configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Values parse but make no sense together
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Terminal error for one pipeline run
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Document unusable
    #[error(transparent)]
    Input(#[from] InputError),

    /// Caller cancelled the run
    #[error("run cancelled")]
    Cancelled,

    /// Run exceeded its deadline
    #[error("run timed out after {}s", .after.as_secs())]
    Timeout {
        /// Configured deadline
        after: Duration,
    },

    /// One stage failed for one input
    #[error("{stage} failed for {input_id}: {source}")]
    Stage {
        /// Failing stage
        stage: Stage,
        /// Document, section, epic or feature id
        input_id: String,
        /// What went wrong
        #[source]
        source: StageError,
    },

    /// Several sibling inputs failed (collect-all policy)
    #[error("{stage} failed for {} inputs; first: {}", .failures.len(), .failures[0])]
    Aggregate {
        /// Stage whose siblings failed
        stage: Stage,
        /// Non-empty, in input order
        failures: Vec<PipelineError>,
    },

    /// Final output broke a cross-artifact invariant
    #[error("output failed integrity check: {0}")]
    Integrity(ValidationResult),

    /// Configuration rejected
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PipelineError {
    /// Attribute a stage failure to its input
    pub fn stage(stage: Stage, input_id: impl Into<String>, source: StageError) -> Self {
        if source.is_cancelled() {
            return Self::Cancelled;
        }
        Self::Stage {
            stage,
            input_id: input_id.into(),
            source,
        }
    }

    /// Check if the run ended by cancellation
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Stage the failure is attributed to, if any
    #[must_use]
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } | Self::Aggregate { stage, .. } => Some(*stage),
            Self::Integrity(_) => Some(Stage::Integrity),
            Self::Input(_) => Some(Stage::Sectioning),
            _ => None,
        }
    }
}
