//! Muse Validate
//!
//! Schema and quality rules for derived delivery artifacts.
//!
//! # Overview
//!
//! Every batch a derivation stage produces passes through
//! [`ArtifactValidator`] before it is accepted:
//! - **Structure**: id patterns, sibling uniqueness, parent references, counts
//! - **Traceability**: governance references cite sections of the document
//! - **Quality**: tautology against the parent, generic phrasing, entry length
//! - **INVEST**: implementation leakage, placeholder benefits, vague criteria
//!
//! # Example
//!
//! ```rust
//! use muse_artifact::{epic_id, Epic, Rule};
//! use muse_validate::{ArtifactValidator, SectionIndex};
//!
//! let sections = SectionIndex::from_ids(["sec-0000-0123456789abcdef"]);
//! let epic = Epic {
//!     epic_id: epic_id("d1", 1),
//!     title: "Breach notification".into(),
//!     objective: "The system supports breach handling".into(),
//!     success_criteria: vec!["Every confirmed breach is filed".into()],
//!     governance_references: vec!["sec-0000-0123456789abcdef".into()],
//! };
//!
//! let result = ArtifactValidator::new().validate_epics("d1", &[epic], &sections);
//! assert!(result.has_rule(Rule::GenericPhrase));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod ids;
pub mod text;
pub mod validator;

pub use validator::{ArtifactValidator, SectionIndex, ValidatorConfig};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for validation
    pub use crate::{ArtifactValidator, SectionIndex, ValidatorConfig};
    pub use muse_artifact::{Rule, ValidationIssue, ValidationResult};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
