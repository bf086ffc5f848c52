//! Muse Artifact Model
//!
//! Typed data flowing through the derivation pipeline.
//!
//! # Core Concepts
//!
//! - [`Document`]: immutable converted text plus source metadata
//! - [`Section`]: heading-delimited span with a stable, content-derived id
//! - [`SectionSummary`]: obligations/actors/constraints/references for a section,
//!   cached by [`ContentHash`]
//! - [`Epic`] → [`Feature`] → [`UserStory`]: the delivery hierarchy
//! - [`ValidationResult`]: rule violations attached to every stage output
//!
//! # Example
//!
//! ```rust,ignore
//! use muse_artifact::{Document, epic_id};
//!
//! let doc = Document::new("policy.pdf", text);
//! assert_eq!(epic_id(doc.id(), 1), format!("epic-{}-01", doc.id()));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod document;
mod hash;
mod hierarchy;
mod output;
mod section;
mod validation;

pub use document::{is_slug, slugify, Document, DocumentError, SourceMetadata};
pub use hash::{ContentHash, HashError};
pub use hierarchy::{
    epic_id, feature_id, story_id, ArtifactKind, DeliveryArtifact, Epic, Feature, UserStory,
    MAX_CRITERIA, MAX_EPICS, MAX_FEATURES_PER_EPIC, MAX_STORIES_PER_FEATURE,
};
pub use output::{AttemptRecord, PipelineOutput, RunStats, Stage};
pub use section::{Section, SectionFindings, SectionSummary};
pub use validation::{Rule, ValidationIssue, ValidationResult};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
