//! Validation results attached to every derivation-stage output

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which rule an issue violates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// Id does not match its documented pattern
    IdFormat,
    /// Two siblings share an id
    DuplicateId,
    /// Child points at a parent that is not in the run
    DanglingReference,
    /// Text restates the parent's corresponding field
    Tautology,
    /// Text matches a generic, untestable phrasing
    GenericPhrase,
    /// Required list empty or entry too short
    Incomplete,
    /// Too many or too few artifacts in a batch
    CountOutOfRange,
    /// Story title names implementation work
    ImplementationLeakage,
    /// Story benefit is a placeholder
    PlaceholderBenefit,
    /// Acceptance criterion is not independently testable
    VagueCriterion,
    /// Governance reference does not cite a known section
    UntracedReference,
    /// Summary list entry is blank
    MalformedSummary,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::IdFormat => "id-format",
            Self::DuplicateId => "duplicate-id",
            Self::DanglingReference => "dangling-reference",
            Self::Tautology => "tautology",
            Self::GenericPhrase => "generic-phrase",
            Self::Incomplete => "incomplete",
            Self::CountOutOfRange => "count-out-of-range",
            Self::ImplementationLeakage => "implementation-leakage",
            Self::PlaceholderBenefit => "placeholder-benefit",
            Self::VagueCriterion => "vague-criterion",
            Self::UntracedReference => "untraced-reference",
            Self::MalformedSummary => "malformed-summary",
        };
        f.write_str(name)
    }
}

/// A single rule violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Offending artifact (or batch parent for count issues)
    pub artifact_id: String,
    /// Offending field, e.g. `acceptance_criteria[2]`
    pub field: String,
    pub rule: Rule,
    pub message: String,
}

impl ValidationIssue {
    /// Create new issue
    #[must_use]
    pub fn new(
        artifact_id: impl Into<String>,
        field: impl Into<String>,
        rule: Rule,
        message: impl Into<String>,
    ) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            field: field.into(),
            rule,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}.{}: {}",
            self.rule, self.artifact_id, self.field, self.message
        )
    }
}

/// Outcome of validating one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Passing result
    #[inline]
    #[must_use]
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    /// Result from collected issues; valid iff there are none
    #[must_use]
    pub fn from_issues(errors: Vec<ValidationIssue>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Fold another result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.valid = self.errors.is_empty();
    }

    /// Whether the batch passed
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Issues for a given rule
    pub fn by_rule(&self, rule: Rule) -> impl Iterator<Item = &ValidationIssue> {
        self.errors.iter().filter(move |issue| issue.rule == rule)
    }

    /// Whether any issue violates `rule`
    #[must_use]
    pub fn has_rule(&self, rule: Rule) -> bool {
        self.by_rule(rule).next().is_some()
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.valid {
            return f.write_str("valid");
        }
        write!(f, "{} issue(s)", self.errors.len())?;
        for issue in self.errors.iter().take(5) {
            write!(f, "; {issue}")?;
        }
        if self.errors.len() > 5 {
            write!(f, "; …")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_issues_sets_valid_flag() {
        assert!(ValidationResult::from_issues(vec![]).is_valid());
        let result = ValidationResult::from_issues(vec![ValidationIssue::new(
            "epic-d-01",
            "objective",
            Rule::GenericPhrase,
            "matches 'works correctly'",
        )]);
        assert!(!result.is_valid());
        assert!(result.has_rule(Rule::GenericPhrase));
        assert!(!result.has_rule(Rule::Tautology));
    }

    #[test]
    fn merge_invalidates() {
        let mut result = ValidationResult::ok();
        result.merge(ValidationResult::from_issues(vec![ValidationIssue::new(
            "f",
            "description",
            Rule::Tautology,
            "restates parent",
        )]));
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn display_lists_issues() {
        let result = ValidationResult::from_issues(vec![ValidationIssue::new(
            "epic-d-01",
            "title",
            Rule::IdFormat,
            "bad id",
        )]);
        assert_eq!(result.to_string(), "1 issue(s); [id-format] epic-d-01.title: bad id");
    }
}
