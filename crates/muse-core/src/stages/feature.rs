//! Feature derivation, one invocation per epic

use super::{attempt_twice, StageOutcome, StageRuntime};
use crate::cancel::CancellationToken;
use crate::error::StageError;
use crate::reasoning::{summaries_weight, FeatureRequest};
use muse_artifact::{Epic, Feature, SectionSummary, Stage, MAX_FEATURES_PER_EPIC};
use muse_validate::SectionIndex;
use std::sync::Arc;
use tracing::info;

/// Derives 1..=5 features for a single epic
#[derive(Debug, Clone)]
pub struct FeatureDerivationStage {
    runtime: StageRuntime,
}

impl FeatureDerivationStage {
    /// Stage over the shared collaborators
    #[must_use]
    pub fn new(runtime: StageRuntime) -> Self {
        Self { runtime }
    }

    /// Derive features for `epic`
    ///
    /// Independent per epic; the caller decides how sibling failures combine.
    ///
    /// # Errors
    /// [`StageError`] once both attempts fail, or on cancellation.
    pub async fn derive(
        &self,
        epic: &Epic,
        summaries: Arc<[SectionSummary]>,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome<Feature>, StageError> {
        let sections = SectionIndex::from_summaries(&summaries);
        let cost = summaries_weight(&summaries);
        let request = FeatureRequest {
            epic: epic.clone(),
            summaries,
            max_features: MAX_FEATURES_PER_EPIC,
        };
        let client = &self.runtime.client;
        let validator = &self.runtime.validator;

        let outcome = attempt_twice(
            Stage::Features,
            &epic.epic_id,
            &self.runtime.limiter,
            cancel,
            cost,
            || client.derive_features(&request),
            |features: &[Feature]| validator.validate_features(epic, features, &sections),
        )
        .await?;
        info!(epic = %epic.epic_id, features = outcome.artifacts.len(), "features derived");
        Ok(outcome)
    }
}
