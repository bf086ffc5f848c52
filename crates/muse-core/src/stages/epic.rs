//! Epic derivation from the full summary set

use super::{attempt_twice, StageOutcome, StageRuntime};
use crate::cancel::CancellationToken;
use crate::error::StageError;
use crate::reasoning::{summaries_weight, EpicRequest};
use muse_artifact::{Epic, SectionSummary, Stage, MAX_EPICS};
use muse_validate::SectionIndex;
use std::sync::Arc;
use tracing::info;

/// Single call over all summaries, yielding 1..=12 epics
#[derive(Debug, Clone)]
pub struct EpicDerivationStage {
    runtime: StageRuntime,
}

impl EpicDerivationStage {
    /// Stage over the shared collaborators
    #[must_use]
    pub fn new(runtime: StageRuntime) -> Self {
        Self { runtime }
    }

    /// Derive the document's epics
    ///
    /// # Errors
    /// [`StageError`] once both attempts fail, or on cancellation.
    pub async fn derive(
        &self,
        document_id: &str,
        summaries: Arc<[SectionSummary]>,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome<Epic>, StageError> {
        let sections = SectionIndex::from_summaries(&summaries);
        let cost = summaries_weight(&summaries);
        let request = EpicRequest {
            document_id: document_id.to_string(),
            summaries,
            max_epics: MAX_EPICS,
        };
        let client = &self.runtime.client;
        let validator = &self.runtime.validator;

        let outcome = attempt_twice(
            Stage::Epics,
            document_id,
            &self.runtime.limiter,
            cancel,
            cost,
            || client.derive_epics(&request),
            |epics: &[Epic]| validator.validate_epics(document_id, epics, &sections),
        )
        .await?;
        info!(document = document_id, epics = outcome.artifacts.len(), "epics derived");
        Ok(outcome)
    }
}
