//! Identifier patterns
//!
//! Patterns are anchored on the parent id, so a feature id is only valid
//! under the epic it claims to belong to.

use once_cell::sync::Lazy;
use regex::Regex;

static SECTION_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"sec-\d{4,}-[0-9a-f]{16}").expect("section id pattern is valid"));

/// `epic-<document_id>-<nn>`
#[must_use]
pub fn epic_pattern(document_id: &str) -> Regex {
    anchored(&format!(r"epic-{}-\d{{2}}", regex::escape(document_id)))
}

/// `<epic_id>-feature-<nn>`
#[must_use]
pub fn feature_pattern(epic_id: &str) -> Regex {
    anchored(&format!(r"{}-feature-\d{{2}}", regex::escape(epic_id)))
}

/// `<feature_id>-story-<nn>-<slug>`
#[must_use]
pub fn story_pattern(feature_id: &str) -> Regex {
    anchored(&format!(
        r"{}-story-\d{{2}}-[a-z0-9]+(?:-[a-z0-9]+)*",
        regex::escape(feature_id)
    ))
}

/// Section ids cited anywhere in `text`
pub fn cited_sections(text: &str) -> impl Iterator<Item = &str> {
    SECTION_ID.find_iter(text).map(|m| m.as_str())
}

fn anchored(body: &str) -> Regex {
    // Parent ids are escaped, so the composed pattern is always valid.
    Regex::new(&format!("^{body}$")).expect("escaped id pattern is valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use muse_artifact::{ContentHash, Section};

    #[test]
    fn epic_ids() {
        let re = epic_pattern("a1b2c3");
        assert!(re.is_match("epic-a1b2c3-01"));
        assert!(re.is_match("epic-a1b2c3-12"));
        assert!(!re.is_match("epic-a1b2c3-1"));
        assert!(!re.is_match("epic-other-01"));
        assert!(!re.is_match("xepic-a1b2c3-01"));
    }

    #[test]
    fn feature_ids_are_scoped_to_epic() {
        let re = feature_pattern("epic-d-01");
        assert!(re.is_match("epic-d-01-feature-03"));
        assert!(!re.is_match("epic-d-02-feature-03"));
        assert!(!re.is_match("epic-d-01-feature-3"));
    }

    #[test]
    fn story_ids_need_slug() {
        let re = story_pattern("epic-d-01-feature-02");
        assert!(re.is_match("epic-d-01-feature-02-story-01-report-a-breach"));
        assert!(!re.is_match("epic-d-01-feature-02-story-01"));
        assert!(!re.is_match("epic-d-01-feature-02-story-01-Report"));
        assert!(!re.is_match("epic-d-01-feature-02-story-01-report--breach"));
    }

    #[test]
    fn parent_ids_are_escaped() {
        let re = epic_pattern("a.b");
        assert!(re.is_match("epic-a.b-01"));
        assert!(!re.is_match("epic-axb-01"));
    }

    #[test]
    fn finds_cited_sections() {
        let text = "See sec-0001-0123456789abcdef and sec-0042-fedcba9876543210.";
        let cited: Vec<_> = cited_sections(text).collect();
        assert_eq!(
            cited,
            vec!["sec-0001-0123456789abcdef", "sec-0042-fedcba9876543210"]
        );
    }

    #[test]
    fn section_index_widens_past_four_digits() {
        let id = Section::derive_id("d1", 10_000, &ContentHash::compute(b"x"));
        assert!(id.starts_with("sec-10000-"));
        assert_eq!(cited_sections(&id).collect::<Vec<_>>(), vec![id.as_str()]);
    }
}
