//! Section summarization with content-addressed caching
//!
//! Each distinct section content is summarized at most once per cache
//! lifetime. Sections sharing content within a run share one reasoning call,
//! and the resulting summary is rebound to every section that carries it.

use crate::cancel::CancellationToken;
use crate::error::StageError;
use crate::limiter::{estimate_tokens, RateLimiter};
use crate::reasoning::ReasoningClient;
use futures::future::try_join_all;
use muse_artifact::{
    ContentHash, Rule, Section, SectionFindings, SectionSummary, ValidationIssue, ValidationResult,
};
use muse_ingest::{CacheError, SummaryCache};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Summaries for a run, in section order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryBatch {
    /// One per section, ordered by `order_index`
    pub summaries: Vec<SectionSummary>,
    /// Sections served from the cache
    pub cache_hits: usize,
    /// Distinct contents summarized by the service
    pub computed: usize,
}

/// Where a summary came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummarySource {
    Cache,
    Service,
}

/// Summarizes sections through the rate limiter, backed by the cache
#[derive(Clone)]
pub struct SectionSummarizer {
    client: Arc<dyn ReasoningClient>,
    limiter: Arc<RateLimiter>,
    cache: SummaryCache,
    strict: bool,
}

impl std::fmt::Debug for SectionSummarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionSummarizer")
            .field("cache", &self.cache)
            .field("strict", &self.strict)
            .finish_non_exhaustive()
    }
}

impl SectionSummarizer {
    /// Summarizer over the given collaborators
    ///
    /// With `strict` unset, a cache conflict is logged as critical and the
    /// existing entry wins instead of failing the section.
    #[must_use]
    pub fn new(
        client: Arc<dyn ReasoningClient>,
        limiter: Arc<RateLimiter>,
        cache: SummaryCache,
        strict: bool,
    ) -> Self {
        Self {
            client,
            limiter,
            cache,
            strict,
        }
    }

    /// Cache in use
    #[must_use]
    pub fn cache(&self) -> &SummaryCache {
        &self.cache
    }

    /// Summarize one section
    ///
    /// # Errors
    /// - [`StageError::Cancelled`] if `cancel` fires
    /// - [`StageError::Call`] if the reasoning call fails
    /// - [`StageError::Rejected`] if the findings contain blank entries
    /// - [`StageError::Cache`] on a cache conflict in strict mode
    pub async fn summarize(
        &self,
        section: &Section,
        cancel: &CancellationToken,
    ) -> Result<(SectionSummary, SummarySource), StageError> {
        let hash = ContentHash::compute(section.content.as_bytes());
        if hash != section.content_hash {
            return Err(StageError::Cache(CacheError::KeyMismatch {
                key: hash,
                actual: section.content_hash,
                section_id: section.section_id.clone(),
            }));
        }

        if let Some(cached) = self.cache.get(&hash).await {
            return Ok((cached.rebind(&section.section_id), SummarySource::Cache));
        }

        let cost = estimate_tokens(&section.content);
        let findings = self
            .limiter
            .run_weighted(cancel, cost, || self.client.summarize(section))
            .await?;

        let check = check_findings(&section.section_id, &findings);
        if !check.is_valid() {
            return Err(StageError::Rejected {
                attempts: 1,
                result: check,
            });
        }

        let summary = SectionSummary::from_findings(section, findings);
        match self.cache.put(hash, summary.clone()).await {
            Ok(()) => {}
            Err(conflict @ CacheError::Consistency { .. }) if !self.strict => {
                error!(critical = true, error = %conflict, "summary cache anomaly, keeping cached entry");
                if let Some(existing) = self.cache.get(&hash).await {
                    return Ok((existing.rebind(&section.section_id), SummarySource::Cache));
                }
            }
            Err(err) => return Err(err.into()),
        }
        debug!(section = %section.section_id, findings = summary_len(&summary), "section summarized");
        Ok((summary, SummarySource::Service))
    }

    /// Summarize every section, fanning out across distinct contents
    ///
    /// Fails on the first section that fails; remaining work is dropped.
    ///
    /// # Errors
    /// The failing section's id with its [`StageError`].
    pub async fn summarize_all(
        &self,
        sections: &[Section],
        cancel: &CancellationToken,
    ) -> Result<SummaryBatch, (String, StageError)> {
        let mut first_by_hash: HashMap<ContentHash, &Section> = HashMap::new();
        for section in sections {
            first_by_hash.entry(section.content_hash).or_insert(section);
        }
        let mut distinct: Vec<&Section> = first_by_hash.values().copied().collect();
        distinct.sort_by_key(|s| s.order_index);

        let results = try_join_all(distinct.iter().map(|section| async move {
            self.summarize(section, cancel)
                .await
                .map_err(|err| (section.section_id.clone(), err))
        }))
        .await?;

        let mut by_hash = HashMap::with_capacity(results.len());
        let mut cache_hits = 0;
        let mut computed = 0;
        for (summary, source) in results {
            match source {
                SummarySource::Cache => cache_hits += 1,
                SummarySource::Service => computed += 1,
            }
            by_hash.insert(summary.content_hash, summary);
        }
        // Duplicated contents reuse the first section's summary.
        cache_hits += sections.len() - distinct.len();

        let summaries = sections
            .iter()
            .filter_map(|section| {
                by_hash
                    .get(&section.content_hash)
                    .map(|summary: &SectionSummary| summary.rebind(&section.section_id))
            })
            .collect();

        Ok(SummaryBatch {
            summaries,
            cache_hits,
            computed,
        })
    }
}

fn summary_len(summary: &SectionSummary) -> usize {
    summary.obligations.len()
        + summary.actors.len()
        + summary.constraints.len()
        + summary.references.len()
}

/// Lists may be empty, but every entry must carry text
fn check_findings(section_id: &str, findings: &SectionFindings) -> ValidationResult {
    let issues = findings
        .lists()
        .flat_map(|(list, entries)| {
            entries
                .iter()
                .enumerate()
                .filter(|(_, entry)| entry.trim().is_empty())
                .map(move |(i, _)| {
                    ValidationIssue::new(
                        section_id,
                        format!("{list}[{i}]"),
                        Rule::MalformedSummary,
                        "blank entry",
                    )
                })
        })
        .collect();
    ValidationResult::from_issues(issues)
}
