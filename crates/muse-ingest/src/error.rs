//! Error types for ingestion
//!
//! - Input errors (document unusable)
//! - Cache errors (content-addressing invariant broken)

use muse_artifact::ContentHash;

/// Caller-supplied input is unusable; never retried
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// Document text is empty or whitespace only
    #[error("document '{document_id}' is empty")]
    EmptyDocument { document_id: String },
}

/// Errors during summary cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A different summary was offered for a hash that is already cached.
    ///
    /// Same hash means same input, so this indicates a defect upstream
    /// (non-deterministic service output or a hashing bug).
    #[error(
        "cache consistency violation for {hash}: cached summary from {existing_section} \
         differs from summary for {incoming_section}"
    )]
    Consistency {
        /// Contested key
        hash: ContentHash,
        /// Section the cached summary came from
        existing_section: String,
        /// Section of the rejected summary
        incoming_section: String,
    },

    /// Summary stored under a key that is not its own content hash
    #[error("summary for {section_id} carries hash {actual}, stored under {key}")]
    KeyMismatch {
        /// Key the caller used
        key: ContentHash,
        /// Hash the summary carries
        actual: ContentHash,
        /// Section the summary belongs to
        section_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_display() {
        let err = InputError::EmptyDocument {
            document_id: "abc".into(),
        };
        assert_eq!(err.to_string(), "document 'abc' is empty");
    }

    #[test]
    fn consistency_display_names_both_sections() {
        let err = CacheError::Consistency {
            hash: ContentHash::compute(b"x"),
            existing_section: "sec-0001-aa".into(),
            incoming_section: "sec-0007-bb".into(),
        };
        let text = err.to_string();
        assert!(text.contains("sec-0001-aa"));
        assert!(text.contains("sec-0007-bb"));
    }
}
