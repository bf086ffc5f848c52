//! Delivery artifacts: Epic → Feature → User Story
//!
//! All three are parsed with `deny_unknown_fields`: the reasoning service is
//! untrusted input and anything that does not match the schema is rejected
//! at the parse boundary, before validation even starts.

use crate::document::slugify;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Most epics a document may yield
pub const MAX_EPICS: usize = 12;
/// Most features per epic
pub const MAX_FEATURES_PER_EPIC: usize = 5;
/// Most stories per feature
pub const MAX_STORIES_PER_FEATURE: usize = 5;
/// Most success / acceptance criteria on an epic or feature
pub const MAX_CRITERIA: usize = 10;

/// Level in the artifact hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Epic,
    Feature,
    Story,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Epic => "epic",
            Self::Feature => "feature",
            Self::Story => "story",
        })
    }
}

/// Common view over the three artifact levels
pub trait DeliveryArtifact {
    /// Hierarchy level
    const KIND: ArtifactKind;

    /// Artifact id
    fn id(&self) -> &str;

    /// Human-readable title
    fn title(&self) -> &str;

    /// Pointers back to the source sections
    fn governance_references(&self) -> &[String];
}

/// High-level objective derived from the whole document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Epic {
    pub epic_id: String,
    pub title: String,
    pub objective: String,
    pub success_criteria: Vec<String>,
    pub governance_references: Vec<String>,
}

/// Implementable capability under one epic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Feature {
    pub feature_id: String,
    pub epic_id: String,
    pub title: String,
    pub business_value: String,
    pub description: String,
    pub acceptance_criteria: Vec<String>,
    pub risk_of_not_delivering: Vec<String>,
    pub governance_references: Vec<String>,
}

/// Testable requirement unit under one feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserStory {
    pub story_id: String,
    pub feature_id: String,
    pub epic_id: String,
    pub title: String,
    pub role: String,
    pub capability: String,
    pub benefit: String,
    pub acceptance_criteria: Vec<String>,
    pub governance_references: Vec<String>,
}

impl UserStory {
    /// Classic "As a … I want … so that …" rendering
    #[must_use]
    pub fn statement(&self) -> String {
        format!(
            "As a {}, I want {}, so that {}.",
            self.role,
            self.capability.trim_end_matches('.'),
            self.benefit.trim_end_matches('.')
        )
    }
}

impl DeliveryArtifact for Epic {
    const KIND: ArtifactKind = ArtifactKind::Epic;

    fn id(&self) -> &str {
        &self.epic_id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn governance_references(&self) -> &[String] {
        &self.governance_references
    }
}

impl DeliveryArtifact for Feature {
    const KIND: ArtifactKind = ArtifactKind::Feature;

    fn id(&self) -> &str {
        &self.feature_id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn governance_references(&self) -> &[String] {
        &self.governance_references
    }
}

impl DeliveryArtifact for UserStory {
    const KIND: ArtifactKind = ArtifactKind::Story;

    fn id(&self) -> &str {
        &self.story_id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn governance_references(&self) -> &[String] {
        &self.governance_references
    }
}

/// `epic-<document_id>-<nn>`
#[must_use]
pub fn epic_id(document_id: &str, n: usize) -> String {
    format!("epic-{document_id}-{n:02}")
}

/// `<epic_id>-feature-<nn>`
#[must_use]
pub fn feature_id(epic_id: &str, n: usize) -> String {
    format!("{epic_id}-feature-{n:02}")
}

/// `<feature_id>-story-<nn>-<slug>`, slug taken from the story title
#[must_use]
pub fn story_id(feature_id: &str, n: usize, title: &str) -> String {
    format!("{feature_id}-story-{n:02}-{}", slugify(title))
}
