//! Story derivation, one invocation per feature

use super::{attempt_twice, StageOutcome, StageRuntime};
use crate::cancel::CancellationToken;
use crate::error::StageError;
use crate::reasoning::{summaries_weight, StoryRequest};
use muse_artifact::{Epic, Feature, SectionSummary, Stage, UserStory, MAX_STORIES_PER_FEATURE};
use muse_validate::SectionIndex;
use std::sync::Arc;
use tracing::info;

/// Derives 1..=5 INVEST-checked stories for a single feature
#[derive(Debug, Clone)]
pub struct StoryDerivationStage {
    runtime: StageRuntime,
}

impl StoryDerivationStage {
    /// Stage over the shared collaborators
    #[must_use]
    pub fn new(runtime: StageRuntime) -> Self {
        Self { runtime }
    }

    /// Derive stories for `feature` under `epic`
    ///
    /// # Errors
    /// [`StageError`] once both attempts fail, or on cancellation.
    pub async fn derive(
        &self,
        feature: &Feature,
        epic: &Epic,
        summaries: Arc<[SectionSummary]>,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome<UserStory>, StageError> {
        let sections = SectionIndex::from_summaries(&summaries);
        let cost = summaries_weight(&summaries);
        let request = StoryRequest {
            feature: feature.clone(),
            epic: epic.clone(),
            summaries,
            max_stories: MAX_STORIES_PER_FEATURE,
        };
        let client = &self.runtime.client;
        let validator = &self.runtime.validator;

        let outcome = attempt_twice(
            Stage::Stories,
            &feature.feature_id,
            &self.runtime.limiter,
            cancel,
            cost,
            || client.derive_stories(&request),
            |stories: &[UserStory]| validator.validate_stories(feature, epic, stories, &sections),
        )
        .await?;
        info!(feature = %feature.feature_id, stories = outcome.artifacts.len(), "stories derived");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::limiter::RateLimiter;
    use crate::reasoning::MockReasoningClient;
    use muse_artifact::Rule;
    use muse_test_utils::fixtures;
    use muse_validate::ArtifactValidator;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn stage(mock: MockReasoningClient) -> StoryDerivationStage {
        StoryDerivationStage::new(StageRuntime::new(
            Arc::new(mock),
            Arc::new(RateLimiter::new(2)),
            ArtifactValidator::new(),
        ))
    }

    fn parents() -> (Epic, Feature, Vec<SectionSummary>) {
        let summaries = fixtures::summaries();
        let epic = fixtures::epics(fixtures::DOCUMENT_ID, 1, &summaries).remove(0);
        let feature = fixtures::features(&epic, 1, &summaries).remove(0);
        (epic, feature, summaries)
    }

    #[tokio::test]
    async fn leaky_title_retried_then_accepted() {
        let (epic, feature, summaries) = parents();
        let good = fixtures::stories(&feature, 2, &summaries);
        let mut leaky = good.clone();
        leaky[0].title = "Build incident dashboard".into();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let first = leaky.clone();
        let second = good.clone();
        let mut mock = MockReasoningClient::new();
        mock.expect_derive_stories().times(2).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(first.clone())
            } else {
                Ok(second.clone())
            }
        });

        let outcome = stage(mock)
            .derive(&feature, &epic, summaries.into(), &CancellationToken::new())
            .await
            .expect("retry accepted");
        assert_eq!(outcome.artifacts, good);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(outcome.rejected[0]
            .result
            .has_rule(Rule::ImplementationLeakage));
    }

    #[tokio::test]
    async fn placeholder_benefit_and_vague_criteria_fail_stage() {
        let (epic, feature, summaries) = parents();
        let mut stories = fixtures::stories(&feature, 1, &summaries);
        stories[0].benefit = "to comply".into();
        stories[0].acceptance_criteria = vec!["Reports are exported as PDF, CSV, etc.".into()];

        let mut mock = MockReasoningClient::new();
        mock.expect_derive_stories()
            .times(2)
            .returning(move |_| Ok(stories.clone()));

        let err = stage(mock)
            .derive(&feature, &epic, summaries.into(), &CancellationToken::new())
            .await
            .expect_err("INVEST failures");
        match err {
            StageError::Rejected { result, .. } => {
                assert!(result.has_rule(Rule::PlaceholderBenefit));
                assert!(result.has_rule(Rule::VagueCriterion));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn six_stories_never_surface() {
        let (epic, feature, summaries) = parents();
        let stories = fixtures::stories(&feature, MAX_STORIES_PER_FEATURE + 1, &summaries);

        let mut mock = MockReasoningClient::new();
        mock.expect_derive_stories()
            .times(2)
            .returning(move |_| Ok(stories.clone()));

        let err = stage(mock)
            .derive(&feature, &epic, summaries.into(), &CancellationToken::new())
            .await
            .expect_err("over cap");
        match err {
            StageError::Rejected { attempts, result } => {
                assert_eq!(attempts, 2);
                assert!(result.has_rule(Rule::CountOutOfRange));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn exhausted_throttling_is_not_retried_by_stage() {
        let (epic, feature, summaries) = parents();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut mock = MockReasoningClient::new();
        mock.expect_derive_stories().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::Throttled {
                retry_after: None,
            })
        });
        let runtime = StageRuntime::new(
            Arc::new(mock),
            Arc::new(RateLimiter::with_policy(
                1,
                crate::limiter::RetryPolicy {
                    max_retries: 2,
                    base_delay: std::time::Duration::from_millis(1),
                    max_delay: std::time::Duration::from_millis(2),
                },
            )),
            ArtifactValidator::new(),
        );

        let err = StoryDerivationStage::new(runtime)
            .derive(&feature, &epic, summaries.into(), &CancellationToken::new())
            .await
            .expect_err("throttled");
        assert!(matches!(
            err,
            StageError::Call(crate::error::CallError::RetriesExhausted { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
