//! Pipeline output handed to the external materializer

use crate::hierarchy::{Epic, Feature, UserStory};
use crate::section::SectionSummary;
use crate::validation::ValidationResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage, used to attribute failures and validation records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Sectioning,
    Summarization,
    Epics,
    Features,
    Stories,
    Integrity,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sectioning => "sectioning",
            Self::Summarization => "summarization",
            Self::Epics => "epic derivation",
            Self::Features => "feature derivation",
            Self::Stories => "story derivation",
            Self::Integrity => "integrity check",
        })
    }
}

/// A rejected attempt that was later retried
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub stage: Stage,
    /// Document, epic or feature id the stage was invoked for
    pub input_id: String,
    /// 1-based attempt number
    pub attempt: u8,
    pub result: ValidationResult,
}

/// Counters collected over one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub sections: usize,
    pub summary_cache_hits: usize,
    pub summaries_computed: usize,
    pub reasoning_calls: u64,
    pub service_retries: u64,
    pub stage_retries: usize,
}

/// Everything a successful run produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub document_id: String,
    pub generated_at: DateTime<Utc>,
    /// Sorted by section order
    pub summaries: Vec<SectionSummary>,
    /// In epic-stage order
    pub epics: Vec<Epic>,
    /// Grouped by epic, in epic order
    pub features: Vec<Feature>,
    /// Grouped by feature, in feature order
    pub stories: Vec<UserStory>,
    /// Rejected attempts that were retried successfully
    pub validation_log: Vec<AttemptRecord>,
    pub stats: RunStats,
}

impl PipelineOutput {
    /// Features under `epic_id`
    pub fn features_for<'a>(&'a self, epic_id: &'a str) -> impl Iterator<Item = &'a Feature> {
        self.features.iter().filter(move |f| f.epic_id == epic_id)
    }

    /// Stories under `feature_id`
    pub fn stories_for<'a>(&'a self, feature_id: &'a str) -> impl Iterator<Item = &'a UserStory> {
        self.stories.iter().filter(move |s| s.feature_id == feature_id)
    }

    /// Look up a feature by id
    #[must_use]
    pub fn feature(&self, feature_id: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.feature_id == feature_id)
    }
}
