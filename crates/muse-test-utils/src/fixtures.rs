//! Documents and artifact batches that pass validation

use muse_artifact::{
    epic_id, feature_id, story_id, Document, Epic, Feature, Section, SectionFindings,
    SectionSummary, UserStory,
};
use muse_ingest::Sectioner;

pub const DOCUMENT_ID: &str = "gdpr-breach";

pub const DOCUMENT_TEXT: &str = "\
# Breach notification
Controllers notify the supervisory authority of a personal data breach within 72 hours.

# Data subject access
Data subjects may request a copy of their personal data free of charge.

# Record retention
Processing records are retained for seven years and produced on request.
";

pub fn document() -> Document {
    Document::with_id(DOCUMENT_ID, "gdpr.md", DOCUMENT_TEXT).unwrap()
}

/// Three sections, one per heading
pub fn sections() -> Vec<Section> {
    Sectioner::new().split(&document()).unwrap()
}

pub fn findings_for(section: &Section) -> SectionFindings {
    SectionFindings {
        obligations: vec![format!("Honour the {} duty", section.title.to_lowercase())],
        actors: vec!["Data protection officer".into()],
        constraints: vec![format!("Applies from clause {}", section.order_index + 1)],
        references: vec![section.title.clone()],
    }
}

pub fn summaries() -> Vec<SectionSummary> {
    sections()
        .iter()
        .map(|section| SectionSummary::from_findings(section, findings_for(section)))
        .collect()
}

fn cite(summaries: &[SectionSummary], n: usize) -> Vec<String> {
    summaries
        .get((n - 1) % summaries.len().max(1))
        .map(|s| vec![format!("{} clause {n}", s.section_id)])
        .unwrap_or_default()
}

/// `n` epics for `document_id`, numbered from 1
pub fn epics(document_id: &str, n: usize, summaries: &[SectionSummary]) -> Vec<Epic> {
    (1..=n)
        .map(|i| Epic {
            epic_id: epic_id(document_id, i),
            title: format!("Regulatory area {i}"),
            objective: format!("Deliver obligations grouped under regulatory area {i}"),
            success_criteria: vec![format!("Auditors sign off area {i} coverage")],
            governance_references: cite(summaries, i),
        })
        .collect()
}

/// `n` features under `epic`, numbered from 1
pub fn features(epic: &Epic, n: usize, summaries: &[SectionSummary]) -> Vec<Feature> {
    (1..=n)
        .map(|i| Feature {
            feature_id: feature_id(&epic.epic_id, i),
            epic_id: epic.epic_id.clone(),
            title: format!("Intake queue {i}"),
            business_value: "Reduces manual follow-up for reviewers".into(),
            description: format!(
                "Queue {i} captures reviewer assignments together with escalation timestamps"
            ),
            acceptance_criteria: vec![
                "Each assignment records the reviewer and a timestamp".into(),
            ],
            risk_of_not_delivering: vec!["Missed escalations lead to penalties".into()],
            governance_references: cite(summaries, i),
        })
        .collect()
}

/// `n` stories under `feature`, numbered from 1
pub fn stories(feature: &Feature, n: usize, summaries: &[SectionSummary]) -> Vec<UserStory> {
    (1..=n)
        .map(|i| {
            let title = format!("Review pending item {i}");
            UserStory {
                story_id: story_id(&feature.feature_id, i, &title),
                feature_id: feature.feature_id.clone(),
                epic_id: feature.epic_id.clone(),
                role: "compliance officer".into(),
                capability: "to see pending items ranked by deadline".into(),
                benefit: "no statutory deadline slips past unnoticed".into(),
                acceptance_criteria: vec!["Items due within 24 hours appear first".into()],
                governance_references: cite(summaries, i),
                title,
            }
        })
        .collect()
}
