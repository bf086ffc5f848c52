//! Boundary to the external reasoning service
//!
//! The pipeline only depends on [`ReasoningClient`]; how requests are phrased
//! and transported is up to the implementation. Responses are parsed into the
//! strict artifact types, so anything off-schema surfaces as
//! [`ServiceError::Malformed`] before validation runs.

mod replay;

pub use replay::{ReplayClient, ReplayFixture};

use crate::error::ServiceError;
use async_trait::async_trait;
use muse_artifact::{Epic, Feature, Section, SectionFindings, SectionSummary, UserStory};
use std::sync::Arc;

/// Inputs for epic derivation
#[derive(Debug, Clone)]
pub struct EpicRequest {
    /// Document the epics belong to
    pub document_id: String,
    /// All section summaries, in section order
    pub summaries: Arc<[SectionSummary]>,
    /// Most epics the response may contain
    pub max_epics: usize,
}

/// Inputs for feature derivation under one epic
#[derive(Debug, Clone)]
pub struct FeatureRequest {
    /// Parent epic
    pub epic: Epic,
    /// All section summaries, in section order
    pub summaries: Arc<[SectionSummary]>,
    /// Most features the response may contain
    pub max_features: usize,
}

/// Inputs for story derivation under one feature
#[derive(Debug, Clone)]
pub struct StoryRequest {
    /// Parent feature
    pub feature: Feature,
    /// Epic owning the feature
    pub epic: Epic,
    /// All section summaries, in section order
    pub summaries: Arc<[SectionSummary]>,
    /// Most stories the response may contain
    pub max_stories: usize,
}

/// One call per operation to the reasoning service
///
/// Implementations are expected to be low-variance and must tag failures as
/// retryable (throttling, transient faults) or fatal (malformed output,
/// refusal).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    /// Extract obligations, actors, constraints and references from a section
    async fn summarize(&self, section: &Section) -> Result<SectionFindings, ServiceError>;

    /// Derive the epic set for a whole document
    async fn derive_epics(&self, request: &EpicRequest) -> Result<Vec<Epic>, ServiceError>;

    /// Derive features for one epic
    async fn derive_features(&self, request: &FeatureRequest)
        -> Result<Vec<Feature>, ServiceError>;

    /// Derive stories for one feature
    async fn derive_stories(&self, request: &StoryRequest)
        -> Result<Vec<UserStory>, ServiceError>;
}

/// Estimated prompt size shared by every derivation request
pub(crate) fn summaries_weight(summaries: &[SectionSummary]) -> u64 {
    summaries
        .iter()
        .flat_map(|s| {
            s.obligations
                .iter()
                .chain(&s.actors)
                .chain(&s.constraints)
                .chain(&s.references)
        })
        .map(|entry| crate::limiter::estimate_tokens(entry))
        .sum()
}
