//! Rule engine applied to every derivation batch
//!
//! The validator is stateless: each call receives the batch, its parents and
//! the run's section index, and returns every issue it finds rather than
//! stopping at the first. The owning stage decides between retry and failure.

use crate::ids;
use crate::text;
use muse_artifact::{
    Epic, Feature, PipelineOutput, Rule, Section, SectionSummary, UserStory, ValidationIssue,
    ValidationResult, MAX_CRITERIA, MAX_EPICS, MAX_FEATURES_PER_EPIC, MAX_STORIES_PER_FEATURE,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::RangeInclusive;
use tracing::debug;

/// Thresholds for the quality rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Token overlap above which a child restates its parent
    pub overlap_threshold: f64,
    /// Fewest words in a list entry
    pub min_entry_words: usize,
    /// Fewest non-space characters in a list entry
    pub min_entry_chars: usize,
    /// Fewest non-space characters in a story benefit
    pub min_benefit_chars: usize,
    /// Require governance references to cite a known section id
    pub require_section_citations: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            overlap_threshold: 0.8,
            min_entry_words: 2,
            min_entry_chars: 8,
            min_benefit_chars: 15,
            require_section_citations: true,
        }
    }
}

/// Section ids known to the current run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionIndex {
    ids: BTreeSet<String>,
}

impl SectionIndex {
    /// Index over arbitrary ids
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Index over the sectioner's output
    #[must_use]
    pub fn from_sections(sections: &[Section]) -> Self {
        Self::from_ids(sections.iter().map(|s| s.section_id.clone()))
    }

    /// Index over the summaries handed to a stage
    #[must_use]
    pub fn from_summaries(summaries: &[SectionSummary]) -> Self {
        Self::from_ids(summaries.iter().map(|s| s.section_id.clone()))
    }

    /// Whether `section_id` belongs to the run
    #[must_use]
    pub fn contains(&self, section_id: &str) -> bool {
        self.ids.contains(section_id)
    }

    /// Number of known sections
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True if no sections are known
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether `reference` cites at least one section and only known ones
    #[must_use]
    pub fn cites(&self, reference: &str) -> bool {
        let mut cited = ids::cited_sections(reference).peekable();
        if cited.peek().is_none() {
            return false;
        }
        cited.all(|id| self.contains(id))
    }
}

/// Shared rule set for epics, features and stories
#[derive(Debug, Clone, Default)]
pub struct ArtifactValidator {
    config: ValidatorConfig,
}

impl ArtifactValidator {
    /// Validator with default thresholds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validator with custom thresholds
    #[must_use]
    pub fn with_config(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Active thresholds
    #[must_use]
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate the epic batch for a document
    #[must_use]
    pub fn validate_epics(
        &self,
        document_id: &str,
        epics: &[Epic],
        sections: &SectionIndex,
    ) -> ValidationResult {
        let mut check = Checker::new(&self.config, sections);
        check.count(document_id, "epics", epics.len(), 1..=MAX_EPICS);

        let pattern = ids::epic_pattern(document_id);
        let mut seen = HashSet::new();
        for epic in epics {
            let id = epic.epic_id.as_str();
            check.id_format(id, "epic_id", pattern.is_match(id), "epic-<document_id>-<nn>");
            check.unique(id, "epic_id", &mut seen);
            check.text(id, "title", &epic.title);
            check.text(id, "objective", &epic.objective);
            check.criteria(id, "success_criteria", &epic.success_criteria, 1..=MAX_CRITERIA, false);
            check.references(id, &epic.governance_references);
        }
        check.finish("epics", document_id)
    }

    /// Validate the feature batch derived for one epic
    #[must_use]
    pub fn validate_features(
        &self,
        epic: &Epic,
        features: &[Feature],
        sections: &SectionIndex,
    ) -> ValidationResult {
        let mut check = Checker::new(&self.config, sections);
        check.count(&epic.epic_id, "features", features.len(), 1..=MAX_FEATURES_PER_EPIC);

        let pattern = ids::feature_pattern(&epic.epic_id);
        let mut seen = HashSet::new();
        for feature in features {
            let id = feature.feature_id.as_str();
            check.id_format(id, "feature_id", pattern.is_match(id), "<epic_id>-feature-<nn>");
            check.unique(id, "feature_id", &mut seen);
            check.parent(id, "epic_id", &feature.epic_id, &epic.epic_id);
            check.text(id, "title", &feature.title);
            check.text(id, "business_value", &feature.business_value);
            check.text(id, "description", &feature.description);
            check.tautology(id, "description", &feature.description, "objective", &epic.objective);
            check.criteria(
                id,
                "acceptance_criteria",
                &feature.acceptance_criteria,
                1..=MAX_CRITERIA,
                true,
            );
            check.criteria(
                id,
                "risk_of_not_delivering",
                &feature.risk_of_not_delivering,
                1..=usize::MAX,
                false,
            );
            check.references(id, &feature.governance_references);
        }
        check.finish("features", &epic.epic_id)
    }

    /// Validate the story batch derived for one feature
    #[must_use]
    pub fn validate_stories(
        &self,
        feature: &Feature,
        epic: &Epic,
        stories: &[UserStory],
        sections: &SectionIndex,
    ) -> ValidationResult {
        let mut check = Checker::new(&self.config, sections);
        check.count(
            &feature.feature_id,
            "stories",
            stories.len(),
            1..=MAX_STORIES_PER_FEATURE,
        );
        check.parent(&feature.feature_id, "epic_id", &feature.epic_id, &epic.epic_id);

        let pattern = ids::story_pattern(&feature.feature_id);
        let mut seen = HashSet::new();
        for story in stories {
            let id = story.story_id.as_str();
            check.id_format(
                id,
                "story_id",
                pattern.is_match(id),
                "<feature_id>-story-<nn>-<slug>",
            );
            check.unique(id, "story_id", &mut seen);
            check.parent(id, "feature_id", &story.feature_id, &feature.feature_id);
            check.parent(id, "epic_id", &story.epic_id, &epic.epic_id);
            check.text(id, "title", &story.title);
            check.leakage(id, &story.title);
            check.text(id, "role", &story.role);
            check.text(id, "capability", &story.capability);
            check.tautology(
                id,
                "capability",
                &story.capability,
                "description",
                &feature.description,
            );
            check.benefit(id, &story.benefit);
            check.criteria(
                id,
                "acceptance_criteria",
                &story.acceptance_criteria,
                1..=MAX_CRITERIA,
                true,
            );
            check.references(id, &story.governance_references);
        }
        check.finish("stories", &feature.feature_id)
    }

    /// Re-check every cross-artifact invariant over a finished run
    ///
    /// Batches are validated against their parents again, and children whose
    /// parent is missing from the output are reported as dangling.
    #[must_use]
    pub fn verify_run(&self, output: &PipelineOutput, sections: &SectionIndex) -> ValidationResult {
        let mut result = self.validate_epics(&output.document_id, &output.epics, sections);

        let epics: HashMap<&str, &Epic> = output
            .epics
            .iter()
            .map(|e| (e.epic_id.as_str(), e))
            .collect();
        let features: HashMap<&str, &Feature> = output
            .features
            .iter()
            .map(|f| (f.feature_id.as_str(), f))
            .collect();

        let mut orphans = Vec::new();
        for feature in &output.features {
            if !epics.contains_key(feature.epic_id.as_str()) {
                orphans.push(ValidationIssue::new(
                    &feature.feature_id,
                    "epic_id",
                    Rule::DanglingReference,
                    format!("epic {} is not in the run", feature.epic_id),
                ));
            }
        }
        for story in &output.stories {
            match features.get(story.feature_id.as_str()) {
                None => orphans.push(ValidationIssue::new(
                    &story.story_id,
                    "feature_id",
                    Rule::DanglingReference,
                    format!("feature {} is not in the run", story.feature_id),
                )),
                Some(feature) if feature.epic_id != story.epic_id => {
                    orphans.push(ValidationIssue::new(
                        &story.story_id,
                        "epic_id",
                        Rule::DanglingReference,
                        format!(
                            "story names epic {} but its feature belongs to {}",
                            story.epic_id, feature.epic_id
                        ),
                    ));
                }
                Some(_) => {}
            }
        }
        for summary in &output.summaries {
            if !sections.is_empty() && !sections.contains(&summary.section_id) {
                orphans.push(ValidationIssue::new(
                    &summary.section_id,
                    "section_id",
                    Rule::DanglingReference,
                    "summary names a section that is not in the run",
                ));
            }
        }
        result.merge(ValidationResult::from_issues(orphans));

        for epic in &output.epics {
            let batch: Vec<Feature> = output.features_for(&epic.epic_id).cloned().collect();
            result.merge(self.validate_features(epic, &batch, sections));
            for feature in &batch {
                let stories: Vec<UserStory> =
                    output.stories_for(&feature.feature_id).cloned().collect();
                result.merge(self.validate_stories(feature, epic, &stories, sections));
            }
        }

        // Ids must be unique across the whole run, not only among siblings.
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        let all_ids = output
            .epics
            .iter()
            .map(|e| e.epic_id.as_str())
            .chain(output.features.iter().map(|f| f.feature_id.as_str()))
            .chain(output.stories.iter().map(|s| s.story_id.as_str()));
        for id in all_ids {
            if !seen.insert(id) {
                duplicates.push(ValidationIssue::new(
                    id,
                    "id",
                    Rule::DuplicateId,
                    "id appears more than once in the run",
                ));
            }
        }
        result.merge(ValidationResult::from_issues(duplicates));
        result
    }
}

/// Issue accumulator for one batch
struct Checker<'a> {
    config: &'a ValidatorConfig,
    sections: &'a SectionIndex,
    issues: Vec<ValidationIssue>,
}

impl<'a> Checker<'a> {
    fn new(config: &'a ValidatorConfig, sections: &'a SectionIndex) -> Self {
        Self {
            config,
            sections,
            issues: Vec::new(),
        }
    }

    fn push(&mut self, id: &str, field: &str, rule: Rule, message: impl Into<String>) {
        self.issues.push(ValidationIssue::new(id, field, rule, message));
    }

    fn count(&mut self, parent: &str, field: &str, len: usize, range: RangeInclusive<usize>) {
        if !range.contains(&len) {
            self.push(
                parent,
                field,
                Rule::CountOutOfRange,
                format!(
                    "{len} {field} returned, expected {}..={}",
                    range.start(),
                    range.end()
                ),
            );
        }
    }

    fn id_format(&mut self, id: &str, field: &str, matches: bool, pattern: &str) {
        if !matches {
            self.push(
                id,
                field,
                Rule::IdFormat,
                format!("'{id}' does not match {pattern}"),
            );
        }
    }

    fn unique<'s>(&mut self, id: &'s str, field: &str, seen: &mut HashSet<&'s str>) {
        if !seen.insert(id) {
            self.push(id, field, Rule::DuplicateId, "sibling shares this id");
        }
    }

    fn parent(&mut self, id: &str, field: &str, claimed: &str, expected: &str) {
        if claimed != expected {
            self.push(
                id,
                field,
                Rule::DanglingReference,
                format!("points at {claimed}, expected {expected}"),
            );
        }
    }

    /// Required free text: non-blank and not generic
    fn text(&mut self, id: &str, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.push(id, field, Rule::Incomplete, "must not be blank");
            return;
        }
        if let Some(phrase) = text::generic_phrase(value) {
            self.push(
                id,
                field,
                Rule::GenericPhrase,
                format!("generic phrasing '{phrase}'"),
            );
        }
    }

    fn tautology(&mut self, id: &str, field: &str, value: &str, parent_field: &str, parent: &str) {
        let ratio = text::overlap(value, parent);
        if ratio > self.config.overlap_threshold {
            self.push(
                id,
                field,
                Rule::Tautology,
                format!(
                    "restates parent {parent_field} ({:.0}% shared tokens)",
                    ratio * 100.0
                ),
            );
        }
    }

    fn entry_is_substantive(&self, entry: &str) -> bool {
        text::word_count(entry) >= self.config.min_entry_words
            && text::visible_chars(entry) >= self.config.min_entry_chars
    }

    fn criteria(
        &mut self,
        id: &str,
        field: &str,
        entries: &[String],
        range: RangeInclusive<usize>,
        testable: bool,
    ) {
        if entries.is_empty() {
            self.push(id, field, Rule::Incomplete, "must not be empty");
        } else if !range.contains(&entries.len()) {
            self.push(
                id,
                field,
                Rule::CountOutOfRange,
                format!("{} entries, at most {} allowed", entries.len(), range.end()),
            );
        }
        for (i, entry) in entries.iter().enumerate() {
            let slot = format!("{field}[{i}]");
            if !self.entry_is_substantive(entry) {
                self.push(
                    id,
                    &slot,
                    Rule::Incomplete,
                    format!("'{}' is too short to be meaningful", entry.trim()),
                );
                continue;
            }
            if let Some(phrase) = text::generic_phrase(entry) {
                self.push(
                    id,
                    &slot,
                    Rule::GenericPhrase,
                    format!("generic phrasing '{phrase}'"),
                );
            }
            if testable {
                if let Some(qualifier) = text::vague_qualifier(entry) {
                    self.push(
                        id,
                        &slot,
                        Rule::VagueCriterion,
                        format!("'{}' is not independently testable", qualifier.trim()),
                    );
                }
            }
        }
    }

    fn references(&mut self, id: &str, references: &[String]) {
        if references.is_empty() {
            self.push(id, "governance_references", Rule::Incomplete, "must not be empty");
            return;
        }
        for (i, reference) in references.iter().enumerate() {
            let slot = format!("governance_references[{i}]");
            if reference.trim().is_empty() {
                self.push(id, &slot, Rule::Incomplete, "must not be blank");
            } else if self.config.require_section_citations && !self.sections.cites(reference) {
                self.push(
                    id,
                    &slot,
                    Rule::UntracedReference,
                    format!("'{reference}' does not cite a section of this document"),
                );
            }
        }
    }

    fn leakage(&mut self, id: &str, title: &str) {
        if let Some(term) = text::leakage_term(title) {
            self.push(
                id,
                "title",
                Rule::ImplementationLeakage,
                format!("title names implementation work ('{term}')"),
            );
        }
    }

    fn benefit(&mut self, id: &str, benefit: &str) {
        if text::is_placeholder_benefit(benefit) {
            self.push(
                id,
                "benefit",
                Rule::PlaceholderBenefit,
                format!("'{}' is a placeholder", benefit.trim()),
            );
        } else if text::visible_chars(benefit) < self.config.min_benefit_chars {
            self.push(
                id,
                "benefit",
                Rule::Incomplete,
                format!(
                    "benefit needs at least {} characters",
                    self.config.min_benefit_chars
                ),
            );
        }
    }

    fn finish(self, batch: &str, parent: &str) -> ValidationResult {
        if !self.issues.is_empty() {
            debug!(batch, parent, issues = self.issues.len(), "batch rejected");
        }
        ValidationResult::from_issues(self.issues)
    }
}
