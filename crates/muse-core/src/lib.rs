//! Muse Core
//!
//! Turns a regulatory document into a traceable delivery hierarchy:
//! - Parses the document into bounded sections
//! - Summarizes sections through a content-addressed cache
//! - Derives epics, then features per epic, then stories per feature
//! - Validates every batch and retries a rejected one exactly once
//! - Bounds concurrent reasoning calls through one shared rate limiter
//!
//! # Example
//!
//! ```rust,no_run
//! use muse_artifact::Document;
//! use muse_core::{CancellationToken, Pipeline, PipelineConfig, ReplayClient, ReplayFixture};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(ReplayClient::new(ReplayFixture::default()));
//! let pipeline = Pipeline::with_config(client, PipelineConfig::new().with_max_concurrent(2))?;
//!
//! let document = Document::new("policy.md", "# Retention\nRecords are kept seven years.");
//! let output = pipeline.run(&document, &CancellationToken::new()).await?;
//!
//! println!("{} epics, {} stories", output.epics.len(), output.stories.len());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod cancel;
pub mod config;
pub mod error;
pub mod limiter;
pub mod pipeline;
pub mod reasoning;
pub mod stages;
pub mod summarizer;

pub use cancel::CancellationToken;
pub use config::{FailurePolicy, PipelineConfig};
pub use error::{CallError, ConfigError, PipelineError, ServiceError, StageError};
pub use limiter::{LimiterConfig, LimiterStats, RateLimiter, RetryPolicy};
pub use pipeline::Pipeline;
pub use reasoning::{
    EpicRequest, FeatureRequest, ReasoningClient, ReplayClient, ReplayFixture, StoryRequest,
};
pub use stages::{
    EpicDerivationStage, FeatureDerivationStage, StageOutcome, StageRuntime,
    StoryDerivationStage,
};
pub use summarizer::{SectionSummarizer, SummaryBatch, SummarySource};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running the pipeline
    pub use crate::{
        CancellationToken, FailurePolicy, Pipeline, PipelineConfig, PipelineError,
        ReasoningClient, ServiceError,
    };
    pub use muse_artifact::{Document, Epic, Feature, PipelineOutput, UserStory};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
