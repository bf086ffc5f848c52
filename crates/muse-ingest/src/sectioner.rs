//! Deterministic document sectioning
//!
//! Uses pulldown-cmark's offset iterator to find heading boundaries, then
//! slices the original text so sections are contiguous and cover every byte.

use crate::error::InputError;
use muse_artifact::{ContentHash, Document, Section};
use pulldown_cmark::{Event, Parser as MdParser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Title given to text that precedes the first heading
pub const PREAMBLE_TITLE: &str = "Preamble";

/// Sectioner settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionerConfig {
    /// Sections larger than this are split at paragraph boundaries
    pub max_section_bytes: usize,
}

impl Default for SectionerConfig {
    fn default() -> Self {
        Self {
            max_section_bytes: 24_000,
        }
    }
}

/// A heading boundary found in the text
#[derive(Debug, Clone, PartialEq, Eq)]
struct Heading {
    /// Byte offset of the start of the heading's line
    start: usize,
    level: u8,
    title: String,
}

/// Splits documents into ordered sections
#[derive(Debug, Clone, Copy, Default)]
pub struct Sectioner {
    config: SectionerConfig,
}

impl Sectioner {
    /// Create sectioner with default limits
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create sectioner with explicit settings
    #[inline]
    #[must_use]
    pub fn with_config(config: SectionerConfig) -> Self {
        Self { config }
    }

    /// Split a document into sections
    ///
    /// Pure: the same document always yields the same sections and ids.
    ///
    /// # Errors
    /// Returns [`InputError::EmptyDocument`] for whitespace-only text.
    pub fn split(&self, document: &Document) -> Result<Vec<Section>, InputError> {
        let text = document.text();
        if text.trim().is_empty() {
            return Err(InputError::EmptyDocument {
                document_id: document.id().to_string(),
            });
        }

        let headings = Self::find_headings(text);
        let spans = Self::spans(text, &headings, &document.source().filename);

        let mut sections = Vec::with_capacity(spans.len());
        for span in spans {
            let parts = split_oversized(text, span.range.clone(), self.config.max_section_bytes);
            let multipart = parts.len() > 1;
            for (k, range) in parts.into_iter().enumerate() {
                let title = if multipart {
                    format!("{} (part {})", span.title, k + 1)
                } else {
                    span.title.clone()
                };
                let order_index = sections.len();
                let content = text[range.clone()].to_string();
                let content_hash = ContentHash::compute(content.as_bytes());
                sections.push(Section {
                    section_id: Section::derive_id(document.id(), order_index, &content_hash),
                    title,
                    level: span.level,
                    heading_path: span.heading_path.clone(),
                    content,
                    content_hash,
                    start_offset: range.start,
                    end_offset: range.end,
                    order_index,
                });
            }
        }

        tracing::debug!(
            document_id = document.id(),
            sections = sections.len(),
            headings = headings.len(),
            "Split document"
        );
        Ok(sections)
    }

    /// Collect top-level headings with their line-start offsets
    fn find_headings(text: &str) -> Vec<Heading> {
        let mut headings = Vec::new();
        let mut current: Option<Heading> = None;

        for (event, range) in MdParser::new(text).into_offset_iter() {
            match event {
                Event::Start(Tag::Heading { level, .. }) => {
                    // Headings nested in block quotes or list items carry a
                    // marker before them on the line; those are not boundaries.
                    let line_start = text[..range.start].rfind('\n').map_or(0, |i| i + 1);
                    if text[line_start..range.start].trim().is_empty() {
                        current = Some(Heading {
                            start: line_start,
                            level: level as u8,
                            title: String::new(),
                        });
                    }
                }
                Event::Text(fragment) | Event::Code(fragment) => {
                    if let Some(ref mut heading) = current {
                        heading.title.push_str(&fragment);
                    }
                }
                Event::End(TagEnd::Heading(_)) => {
                    if let Some(mut heading) = current.take() {
                        heading.title = heading.title.trim().to_string();
                        headings.push(heading);
                    }
                }
                _ => {}
            }
        }

        headings
    }

    /// Turn heading boundaries into contiguous spans covering the whole text
    fn spans(text: &str, headings: &[Heading], filename: &str) -> Vec<Span> {
        if headings.is_empty() {
            let title = if filename.trim().is_empty() {
                "Document".to_string()
            } else {
                filename.to_string()
            };
            return vec![Span {
                range: 0..text.len(),
                title,
                level: 0,
                heading_path: Vec::new(),
            }];
        }

        let mut spans = Vec::with_capacity(headings.len() + 1);
        let first = headings[0].start;
        let has_preamble = first > 0 && !text[..first].trim().is_empty();
        if has_preamble {
            spans.push(Span {
                range: 0..first,
                title: PREAMBLE_TITLE.to_string(),
                level: 0,
                heading_path: Vec::new(),
            });
        }

        let mut stack: Vec<(u8, String)> = Vec::new();
        for (i, heading) in headings.iter().enumerate() {
            while stack.last().is_some_and(|(level, _)| *level >= heading.level) {
                stack.pop();
            }
            let heading_path = stack.iter().map(|(_, title)| title.clone()).collect();
            stack.push((heading.level, heading.title.clone()));

            // Blank leading text is folded into the first section.
            let start = if i == 0 && !has_preamble { 0 } else { heading.start };
            let end = headings.get(i + 1).map_or(text.len(), |next| next.start);
            spans.push(Span {
                range: start..end,
                title: heading.title.clone(),
                level: heading.level,
                heading_path,
            });
        }

        spans
    }
}

#[derive(Debug)]
struct Span {
    range: Range<usize>,
    title: String,
    level: u8,
    heading_path: Vec<String>,
}

/// Split `range` into chunks of at most `max` bytes, preferring blank lines
fn split_oversized(text: &str, range: Range<usize>, max: usize) -> Vec<Range<usize>> {
    let max = max.max(1);
    let mut parts = Vec::new();
    let mut cursor = range.start;

    while range.end - cursor > max {
        let limit = floor_char_boundary(text, cursor + max);
        let window = &text[cursor..limit];
        let mut cut = match window.rfind("\n\n") {
            Some(p) if p > 0 => cursor + p + 2,
            _ => limit,
        };
        if cut <= cursor {
            cut = ceil_char_boundary(text, cursor + 1);
        }
        parts.push(cursor..cut);
        cursor = cut;
    }
    parts.push(cursor..range.end);
    parts
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    while !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const POLICY: &str = "\
Issued by the Board.

# Data Protection Policy

Applies to all staff.

## Retention

Records are kept for seven years.

## Breach Notification

Notify the regulator within 72 hours.

# Enforcement

Violations are escalated to HR.
";

    fn doc(text: &str) -> Document {
        Document::new("policy.md", text)
    }

    #[test]
    fn splits_on_headings_with_preamble() {
        let sections = Sectioner::new().split(&doc(POLICY)).unwrap();
        let titles: Vec<_> = sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                PREAMBLE_TITLE,
                "Data Protection Policy",
                "Retention",
                "Breach Notification",
                "Enforcement"
            ]
        );
        assert_eq!(sections[2].level, 2);
        assert_eq!(sections[2].heading_path, vec!["Data Protection Policy".to_string()]);
        assert!(sections[4].heading_path.is_empty());
        assert!(sections[3].content.contains("72 hours"));
    }

    #[test]
    fn sections_are_contiguous_and_ordered() {
        let text = POLICY;
        let sections = Sectioner::new().split(&doc(text)).unwrap();
        assert_eq!(sections[0].start_offset, 0);
        assert_eq!(sections.last().unwrap().end_offset, text.len());
        for (i, pair) in sections.windows(2).enumerate() {
            assert_eq!(pair[0].end_offset, pair[1].start_offset);
            assert_eq!(pair[0].order_index, i);
        }
        let rebuilt: String = sections.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn no_headings_yields_single_section() {
        let sections = Sectioner::new()
            .split(&doc("Plain converted text without any headings."))
            .unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, "policy.md");
        assert_eq!(sections[0].level, 0);
    }

    #[test]
    fn empty_document_is_rejected() {
        let result = Sectioner::new().split(&doc("  \n\t "));
        assert!(matches!(result, Err(InputError::EmptyDocument { .. })));
    }

    #[test]
    fn blank_lead_folds_into_first_section() {
        let sections = Sectioner::new().split(&doc("\n\n# Scope\nAll staff.\n")).unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].start_offset, 0);
        assert_eq!(sections[0].title, "Scope");
    }

    #[test]
    fn headings_in_code_and_quotes_are_not_boundaries() {
        let text = "# Real\n\n```\n# not a heading\n```\n\n> # quoted\n\nbody\n";
        let sections = Sectioner::new().split(&doc(text)).unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, "Real");
    }

    #[test]
    fn setext_headings_split() {
        let text = "Scope\n=====\n\nAll staff.\n\nRetention\n---------\n\nSeven years.\n";
        let sections = Sectioner::new().split(&doc(text)).unwrap();
        let titles: Vec<_> = sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Scope", "Retention"]);
    }

    #[test]
    fn oversized_sections_split_on_paragraphs() {
        let paragraph = "Each controller shall keep a record of processing activities.\n\n";
        let text = format!("# Records\n\n{}", paragraph.repeat(20));
        let sectioner = Sectioner::with_config(SectionerConfig {
            max_section_bytes: 300,
        });
        let sections = sectioner.split(&doc(&text)).unwrap();

        assert!(sections.len() > 1);
        assert_eq!(sections[0].title, "Records (part 1)");
        assert_eq!(sections[1].title, "Records (part 2)");
        for section in &sections {
            assert!(section.content.len() <= 300);
        }
        let rebuilt: String = sections.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn oversized_paragraph_splits_on_char_boundary() {
        let text = format!("# Ünïcödé\n{}", "é".repeat(100));
        let sectioner = Sectioner::with_config(SectionerConfig {
            max_section_bytes: 33,
        });
        let sections = sectioner.split(&doc(&text)).unwrap();
        let rebuilt: String = sections.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn identical_content_shares_hash_but_not_id() {
        let text = "# A\nSame body.\n# A\nSame body.\n";
        let sections = Sectioner::new().split(&doc(text)).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].content_hash, sections[1].content_hash);
        assert_ne!(sections[0].section_id, sections[1].section_id);
    }

    proptest! {
        #[test]
        fn split_is_deterministic_and_covering(
            blocks in proptest::collection::vec(
                (0u8..4, "[a-zA-Z ]{0,12}", "[a-z .\n]{0,80}"),
                0..8,
            )
        ) {
            let mut text = String::new();
            for (level, title, body) in &blocks {
                if *level > 0 {
                    text.push_str(&"#".repeat(*level as usize));
                    text.push(' ');
                    text.push_str(title);
                    text.push('\n');
                }
                text.push_str(body);
                text.push('\n');
            }
            let document = doc(&text);
            let sectioner = Sectioner::with_config(SectionerConfig { max_section_bytes: 64 });

            match sectioner.split(&document) {
                Ok(first) => {
                    let second = sectioner.split(&document).unwrap();
                    prop_assert_eq!(&first, &second);
                    prop_assert_eq!(first[0].start_offset, 0);
                    prop_assert_eq!(first.last().unwrap().end_offset, text.len());
                    for pair in first.windows(2) {
                        prop_assert_eq!(pair[0].end_offset, pair[1].start_offset);
                    }
                }
                Err(InputError::EmptyDocument { .. }) => prop_assert!(text.trim().is_empty()),
            }
        }
    }
}
