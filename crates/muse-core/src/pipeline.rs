//! Pipeline orchestrator
//!
//! Sequences the stages for one document:
//!
//! ```text
//! Sectioner → SectionSummarizer → EpicDerivationStage
//!           → FeatureDerivationStage (per epic, concurrent)
//!           → StoryDerivationStage (per feature, concurrent)
//!           → whole-run integrity check
//! ```
//!
//! A run either returns the complete output or a single terminal error
//! naming the stage and input that failed. Partial results are discarded.

use crate::cancel::CancellationToken;
use crate::config::{FailurePolicy, PipelineConfig};
use crate::error::{ConfigError, PipelineError, StageError};
use crate::limiter::RateLimiter;
use crate::reasoning::ReasoningClient;
use crate::stages::{
    EpicDerivationStage, FeatureDerivationStage, StageOutcome, StageRuntime,
    StoryDerivationStage,
};
use crate::summarizer::SectionSummarizer;
use chrono::Utc;
use futures::future::{join_all, try_join_all};
use muse_artifact::{
    AttemptRecord, Document, Feature, PipelineOutput, RunStats, SectionSummary, Stage,
};
use muse_ingest::{Sectioner, SummaryCache};
use muse_validate::{ArtifactValidator, SectionIndex};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Staged derivation pipeline
pub struct Pipeline {
    config: PipelineConfig,
    client: Arc<dyn ReasoningClient>,
    limiter: Arc<RateLimiter>,
    validator: Arc<ArtifactValidator>,
    sectioner: Sectioner,
    summarizer: SectionSummarizer,
    epics: EpicDerivationStage,
    features: FeatureDerivationStage,
    stories: StoryDerivationStage,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("limiter", &self.limiter.stats())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Pipeline with default configuration
    #[must_use]
    pub fn new(client: Arc<dyn ReasoningClient>) -> Self {
        let config = PipelineConfig::default();
        let cache = SummaryCache::from_config(&config.cache);
        Self::assemble(client, config, cache)
    }

    /// Pipeline with validated configuration
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] if the configuration is inconsistent.
    pub fn with_config(
        client: Arc<dyn ReasoningClient>,
        config: PipelineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let cache = SummaryCache::from_config(&config.cache);
        Ok(Self::assemble(client, config, cache))
    }

    /// Use an existing summary cache, e.g. one shared between pipelines
    #[must_use]
    pub fn with_cache(self, cache: SummaryCache) -> Self {
        Self::assemble(self.client, self.config, cache)
    }

    fn assemble(
        client: Arc<dyn ReasoningClient>,
        config: PipelineConfig,
        cache: SummaryCache,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::from_config(&config.limiter));
        let validator = ArtifactValidator::with_config(config.validator.clone());
        let runtime = StageRuntime::new(Arc::clone(&client), Arc::clone(&limiter), validator);
        let summarizer = SectionSummarizer::new(
            Arc::clone(&client),
            Arc::clone(&limiter),
            cache,
            config.cache.strict,
        );
        Self {
            sectioner: Sectioner::with_config(config.sectioner),
            summarizer,
            epics: EpicDerivationStage::new(runtime.clone()),
            features: FeatureDerivationStage::new(runtime.clone()),
            stories: StoryDerivationStage::new(runtime.clone()),
            validator: runtime.validator,
            limiter,
            client,
            config,
        }
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Summary cache
    #[must_use]
    pub fn cache(&self) -> &SummaryCache {
        self.summarizer.cache()
    }

    /// Shared rate limiter
    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Derive the full artifact hierarchy for `document`
    ///
    /// `cancel` aborts the run from outside; the run also stops on its own
    /// deadline and, under [`FailurePolicy::FailFast`], on the first failure.
    ///
    /// # Errors
    /// The single terminal [`PipelineError`] for the run.
    pub async fn run(
        &self,
        document: &Document,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutput, PipelineError> {
        let run = cancel.child_token();
        let result = match self.config.run_timeout() {
            Some(after) => {
                match tokio::time::timeout(after, self.execute(document, &run)).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(document = document.id(), secs = after.as_secs(), "run deadline exceeded");
                        Err(PipelineError::Timeout { after })
                    }
                }
            }
            None => self.execute(document, &run).await,
        };
        // Nothing from this run may outlive it.
        run.cancel();

        match &result {
            Ok(output) => info!(
                document = document.id(),
                epics = output.epics.len(),
                features = output.features.len(),
                stories = output.stories.len(),
                calls = output.stats.reasoning_calls,
                "run completed"
            ),
            Err(err) => error!(document = document.id(), error = %err, "run failed"),
        }
        result
    }

    async fn execute(
        &self,
        document: &Document,
        run: &CancellationToken,
    ) -> Result<PipelineOutput, PipelineError> {
        let before = self.limiter.stats();
        info!(document = document.id(), bytes = document.text().len(), "run started");

        let sections = self.sectioner.split(document)?;
        let index = SectionIndex::from_sections(&sections);
        info!(document = document.id(), sections = sections.len(), "document sectioned");

        let batch = self
            .summarizer
            .summarize_all(&sections, run)
            .await
            .map_err(|(section_id, err)| {
                run.cancel();
                PipelineError::stage(Stage::Summarization, section_id, err)
            })?;
        info!(
            computed = batch.computed,
            cache_hits = batch.cache_hits,
            "sections summarized"
        );
        let summaries: Arc<[SectionSummary]> = batch.summaries.into();

        let mut log = RunLog::default();

        let epics = self
            .epics
            .derive(document.id(), Arc::clone(&summaries), run)
            .await
            .map_err(|err| PipelineError::stage(Stage::Epics, document.id(), err))?;
        let epics = log.absorb(epics);

        let feature_jobs = epics.iter().map(|epic| {
            (
                epic.epic_id.clone(),
                self.features.derive(epic, Arc::clone(&summaries), run),
            )
        });
        let feature_batches: Vec<Vec<Feature>> = self
            .fan_out(Stage::Features, run, feature_jobs)
            .await?
            .into_iter()
            .map(|outcome| log.absorb(outcome))
            .collect();

        let story_jobs = epics
            .iter()
            .zip(&feature_batches)
            .flat_map(|(epic, features)| features.iter().map(move |feature| (epic, feature)))
            .map(|(epic, feature)| {
                (
                    feature.feature_id.clone(),
                    self.stories.derive(feature, epic, Arc::clone(&summaries), run),
                )
            });
        let story_batches = self.fan_out(Stage::Stories, run, story_jobs).await?;
        let stories = story_batches
            .into_iter()
            .flat_map(|outcome| log.absorb(outcome))
            .collect();

        let after = self.limiter.stats();
        let output = PipelineOutput {
            document_id: document.id().to_string(),
            generated_at: Utc::now(),
            summaries: summaries.to_vec(),
            epics,
            features: feature_batches.into_iter().flatten().collect(),
            stories,
            validation_log: log.records,
            stats: RunStats {
                sections: sections.len(),
                summary_cache_hits: batch.cache_hits,
                summaries_computed: batch.computed,
                reasoning_calls: after.calls_started.saturating_sub(before.calls_started),
                service_retries: after.retries.saturating_sub(before.retries),
                stage_retries: log.retries,
            },
        };

        let integrity = self.validator.verify_run(&output, &index);
        if !integrity.is_valid() {
            return Err(PipelineError::Integrity(integrity));
        }
        Ok(output)
    }

    /// Run sibling stage invocations concurrently under the failure policy
    ///
    /// Results keep input order regardless of completion order.
    async fn fan_out<T, Fut, I>(
        &self,
        stage: Stage,
        run: &CancellationToken,
        jobs: I,
    ) -> Result<Vec<StageOutcome<T>>, PipelineError>
    where
        I: IntoIterator<Item = (String, Fut)>,
        Fut: Future<Output = Result<StageOutcome<T>, StageError>>,
    {
        let attributed = jobs.into_iter().map(|(input_id, job)| async move {
            job.await
                .map_err(|err| PipelineError::stage(stage, input_id, err))
        });

        match self.config.failure_policy {
            FailurePolicy::FailFast => {
                let fail_fast = attributed.map(|job| async move {
                    let result = job.await;
                    if result.is_err() {
                        run.cancel();
                    }
                    result
                });
                try_join_all(fail_fast).await
            }
            FailurePolicy::CollectAll => {
                let mut outcomes = Vec::new();
                let mut failures = Vec::new();
                for result in join_all(attributed).await {
                    match result {
                        Ok(outcome) => outcomes.push(outcome),
                        Err(err) => failures.push(err),
                    }
                }
                if run.is_cancelled() || failures.iter().any(PipelineError::is_cancelled) {
                    return Err(PipelineError::Cancelled);
                }
                match failures.len() {
                    0 => Ok(outcomes),
                    1 => Err(failures.remove(0)),
                    _ => Err(PipelineError::Aggregate { stage, failures }),
                }
            }
        }
    }
}

/// Rejected attempts and retry count accumulated over a run
#[derive(Debug, Default)]
struct RunLog {
    records: Vec<AttemptRecord>,
    retries: usize,
}

impl RunLog {
    fn absorb<T>(&mut self, outcome: StageOutcome<T>) -> Vec<T> {
        self.records.extend(outcome.rejected);
        self.retries += usize::from(outcome.retried);
        outcome.artifacts
    }
}
