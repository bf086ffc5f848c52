//! Source documents
//!
//! A [`Document`] is the immutable input to a derivation run: converted text
//! plus the metadata needed to trace artifacts back to it.

use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};

/// Metadata describing where the text came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Original filename as uploaded
    pub filename: String,
    /// Hash of the converted text
    pub checksum: ContentHash,
}

/// Converted document text, owned by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    document_id: String,
    text: String,
    source: SourceMetadata,
}

impl Document {
    /// Create a document whose id is derived from its content
    ///
    /// The id is the short form of the text's content hash, so the same text
    /// always produces the same artifact ids.
    #[must_use]
    pub fn new(filename: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let checksum = ContentHash::compute(text.as_bytes());
        Self {
            document_id: checksum.short(),
            text,
            source: SourceMetadata {
                filename: filename.into(),
                checksum,
            },
        }
    }

    /// Create a document with a caller-assigned id
    ///
    /// # Errors
    /// Returns [`DocumentError::InvalidId`] unless the id is lowercase
    /// alphanumeric segments joined by single hyphens.
    pub fn with_id(
        document_id: impl Into<String>,
        filename: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<Self, DocumentError> {
        let document_id = document_id.into();
        if !is_slug(&document_id) {
            return Err(DocumentError::InvalidId(document_id));
        }
        let mut document = Self::new(filename, text);
        document.document_id = document_id;
        Ok(document)
    }

    /// Document identifier used in artifact ids
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.document_id
    }

    /// Converted text
    #[inline]
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Source metadata
    #[inline]
    #[must_use]
    pub fn source(&self) -> &SourceMetadata {
        &self.source
    }
}

/// Lowercase alphanumeric segments joined by single hyphens
#[must_use]
pub fn is_slug(s: &str) -> bool {
    !s.is_empty()
        && s.split('-').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        })
}

/// Turn free text into a slug (`"Export Audit Log!"` → `"export-audit-log"`)
#[must_use]
pub fn slugify(text: &str) -> String {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Errors constructing documents
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// Caller-supplied id is not a slug
    #[error("invalid document id '{0}': expected lowercase alphanumerics joined by '-'")]
    InvalidId(String),
}
