//! Text heuristics shared by the quality rules
//!
//! Token overlap for tautology detection, and the deny-lists for generic,
//! vague and implementation-flavoured phrasing.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// Words ignored when comparing descriptive text
const STOPWORDS: &[&str] = &[
    "a", "all", "an", "and", "any", "are", "as", "at", "be", "by", "for", "from", "has", "have",
    "in", "is", "it", "its", "must", "of", "on", "or", "shall", "should", "that", "the", "their",
    "this", "to", "will", "with", "within",
];

static GENERIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(is implemented|system supports|works correctly|as described|as expected|functions properly|works as intended|is working|meets (?:all )?requirements|handled appropriately)\b",
    )
    .expect("generic phrase pattern is valid")
});

static LEAKAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(implement(?:s|ed|ing|ation)?|code|coding|build(?:s|ing)?|configur(?:e|es|ed|ing)|set[\s-]?up)\b",
    )
    .expect("leakage pattern is valid")
});

static VAGUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\betc\b\.?|(?:\.\.\.|…)\s*$|\band so on\b|\bas needed\b|\bas appropriate\b)")
        .expect("vague qualifier pattern is valid")
});

/// Benefits that carry no information
const PLACEHOLDER_BENEFITS: &[&str] = &[
    "to comply",
    "comply",
    "compliance",
    "for compliance",
    "to be compliant",
    "n/a",
    "na",
    "tbd",
    "none",
];

/// Lowercased content words, stopwords removed
#[must_use]
pub fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// How closely `child` restates `parent`, from 0.0 to 1.0
///
/// The larger of two shares: the child's content words found in the parent,
/// and the parent's content words found in the child. A verbatim copy with a
/// clause appended still covers the whole parent and scores 1.0. A child with
/// no content words on either side scores 0.0.
#[must_use]
pub fn overlap(child: &str, parent: &str) -> f64 {
    let child = tokens(child);
    let parent = tokens(parent);
    if child.is_empty() || parent.is_empty() {
        return 0.0;
    }
    let shared = child.intersection(&parent).count();
    #[allow(clippy::cast_precision_loss)]
    let ratio = shared as f64 / child.len().min(parent.len()) as f64;
    ratio
}

/// Number of words containing at least one alphanumeric character
#[must_use]
pub fn word_count(text: &str) -> usize {
    text.split_whitespace()
        .filter(|w| w.chars().any(char::is_alphanumeric))
        .count()
}

/// Number of non-whitespace characters
#[must_use]
pub fn visible_chars(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

/// First generic phrase found, if any
#[must_use]
pub fn generic_phrase(text: &str) -> Option<&str> {
    GENERIC.find(text).map(|m| m.as_str())
}

/// First implementation-leakage term found, if any
#[must_use]
pub fn leakage_term(text: &str) -> Option<&str> {
    LEAKAGE.find(text).map(|m| m.as_str())
}

/// First vague qualifier found, if any
#[must_use]
pub fn vague_qualifier(text: &str) -> Option<&str> {
    VAGUE.find(text).map(|m| m.as_str())
}

/// Whether a benefit is a known placeholder
#[must_use]
pub fn is_placeholder_benefit(text: &str) -> bool {
    let normalized = text
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation() && c != '/')
        .to_lowercase();
    PLACEHOLDER_BENEFITS.contains(&normalized.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn verbatim_copy_fully_overlaps() {
        let objective = "Ensure personal data breaches are reported to the regulator within 72 hours";
        assert!((overlap(objective, objective) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn superset_with_few_new_words_is_near_duplicate() {
        let parent = "Ensure personal data breaches are reported to the regulator within 72 hours";
        let child = "Ensure that all personal data breaches are reported to the regulator within 72 hours";
        assert!(overlap(child, parent) > 0.8);
    }

    #[test]
    fn parent_copied_with_a_new_clause_fully_overlaps() {
        let parent = "Ensure personal data breaches are reported to the regulator within 72 hours";
        let child = format!("{parent} through a shared register and escalation rota");
        assert!((overlap(&child, parent) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn refined_text_is_not_near_duplicate() {
        let parent = "Ensure personal data breaches are reported to the regulator within 72 hours";
        let child = "Detect suspected breaches from access-log anomalies and open an incident ticket for triage";
        assert!(overlap(child, parent) < 0.8);
    }

    #[test]
    fn stopwords_do_not_count() {
        assert!(tokens("the and of to").is_empty());
        assert_eq!(overlap("the of", "anything"), 0.0);
    }

    #[test]
    fn generic_phrases_detected() {
        assert_eq!(generic_phrase("The export works correctly"), Some("works correctly"));
        assert_eq!(generic_phrase("The System Supports audit"), Some("System Supports"));
        assert!(generic_phrase("Export completes within 5 seconds for 10k records").is_none());
    }

    #[test]
    fn leakage_terms_detected_on_word_boundaries() {
        assert!(leakage_term("Implement breach register").is_some());
        assert!(leakage_term("Set up retention job").is_some());
        assert!(leakage_term("Configure alerting").is_some());
        assert!(leakage_term("Report a breach to the regulator").is_none());
        assert!(leakage_term("Encode consent receipts").is_none());
    }

    #[test]
    fn vague_qualifiers_detected() {
        assert!(vague_qualifier("Supports PDF, CSV, etc.").is_some());
        assert!(vague_qualifier("The user sees the list...").is_some());
        assert!(vague_qualifier("The user sees the list…").is_some());
        assert!(vague_qualifier("Notifications are sent as needed").is_some());
        assert!(vague_qualifier("Export contains every record created in the last 30 days").is_none());
    }

    #[test]
    fn placeholder_benefits() {
        assert!(is_placeholder_benefit("To comply."));
        assert!(is_placeholder_benefit(" N/A "));
        assert!(!is_placeholder_benefit("the regulator is informed before the statutory deadline"));
    }

    #[test]
    fn word_and_char_counts() {
        assert_eq!(word_count("  - ; Notify DPO "), 2);
        assert_eq!(visible_chars("a b\tc"), 3);
    }

    proptest! {
        #[test]
        fn overlap_is_a_ratio(child in "[a-z ]{0,60}", parent in "[a-z ]{0,60}") {
            let value = overlap(&child, &parent);
            prop_assert!((0.0..=1.0).contains(&value));
        }
    }
}
