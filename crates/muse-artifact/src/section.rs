//! Sections and their summaries

use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};

/// A contiguous, heading-delimited span of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Stable id derived from `(document_id, order_index, content_hash)`
    pub section_id: String,
    /// Heading text (or `Preamble` / the filename for headless spans)
    pub title: String,
    /// Heading level, 0 for text without a heading
    pub level: u8,
    /// Titles of enclosing headings, outermost first
    pub heading_path: Vec<String>,
    /// Raw text of the span, heading included
    pub content: String,
    /// Hash of `content`
    pub content_hash: ContentHash,
    /// Byte offset of the first byte in the document text
    pub start_offset: usize,
    /// Byte offset one past the last byte
    pub end_offset: usize,
    /// Position in document order
    pub order_index: usize,
}

impl Section {
    /// Derive the stable section id
    #[must_use]
    pub fn derive_id(document_id: &str, order_index: usize, content_hash: &ContentHash) -> String {
        let order = order_index.to_string();
        let hash = content_hash.to_string();
        let digest = ContentHash::compute_parts([document_id, order.as_str(), hash.as_str()]);
        format!("sec-{order_index:04}-{}", digest.short())
    }
}

/// What the reasoning service extracted from one section's text
///
/// Lists may be empty; entries may not be blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SectionFindings {
    #[serde(default)]
    pub obligations: Vec<String>,
    #[serde(default)]
    pub actors: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub references: Vec<String>,
}

impl SectionFindings {
    /// Iterate `(list name, entries)` pairs
    pub fn lists(&self) -> impl Iterator<Item = (&'static str, &[String])> {
        [
            ("obligations", self.obligations.as_slice()),
            ("actors", self.actors.as_slice()),
            ("constraints", self.constraints.as_slice()),
            ("references", self.references.as_slice()),
        ]
        .into_iter()
    }

    /// Total number of entries across all lists
    #[must_use]
    pub fn len(&self) -> usize {
        self.lists().map(|(_, entries)| entries.len()).sum()
    }

    /// True when every list is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Summary of one section, immutable once created
///
/// Cached by `content_hash` alone; `section_id` records which section the
/// summary was most recently bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SectionSummary {
    pub section_id: String,
    pub content_hash: ContentHash,
    pub obligations: Vec<String>,
    pub actors: Vec<String>,
    pub constraints: Vec<String>,
    pub references: Vec<String>,
}

impl SectionSummary {
    /// Bind findings to the section they were extracted from
    #[must_use]
    pub fn from_findings(section: &Section, findings: SectionFindings) -> Self {
        Self {
            section_id: section.section_id.clone(),
            content_hash: section.content_hash,
            obligations: findings.obligations,
            actors: findings.actors,
            constraints: findings.constraints,
            references: findings.references,
        }
    }

    /// Same summary re-addressed to another section with identical content
    #[must_use]
    pub fn rebind(&self, section_id: &str) -> Self {
        Self {
            section_id: section_id.to_string(),
            ..self.clone()
        }
    }

    /// Content equality, ignoring which section the summary is bound to
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.content_hash == other.content_hash
            && self.obligations == other.obligations
            && self.actors == other.actors
            && self.constraints == other.constraints
            && self.references == other.references
    }
}
