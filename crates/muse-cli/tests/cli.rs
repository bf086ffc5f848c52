//! Black-box runs of the `muse` binary.

use muse_artifact::PipelineOutput;
use muse_core::ReplayFixture;
use muse_test_utils::fixtures;
use pretty_assertions::assert_eq;
use std::path::Path;
use std::process::{Command, Output};

fn muse(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_muse"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("binary runs")
}

fn write(dir: &Path, name: &str, contents: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write file");
    path.to_string_lossy().into_owned()
}

/// Responses for one epic, two features and one story per feature
fn recorded_responses() -> ReplayFixture {
    let sections = fixtures::sections();
    let summaries = fixtures::summaries();
    let epics = fixtures::epics(fixtures::DOCUMENT_ID, 1, &summaries);
    let features = fixtures::features(&epics[0], 2, &summaries);

    let mut fixture = ReplayFixture {
        epics: epics.clone(),
        ..ReplayFixture::default()
    };
    for section in &sections {
        fixture
            .summaries
            .insert(section.content_hash.to_string(), fixtures::findings_for(section));
    }
    fixture
        .features
        .insert(epics[0].epic_id.clone(), features.clone());
    for feature in &features {
        fixture.stories.insert(
            feature.feature_id.clone(),
            fixtures::stories(feature, 1, &summaries),
        );
    }
    fixture
}

#[test]
fn split_prints_sections() {
    let dir = tempfile::tempdir().expect("temp dir");
    let doc = write(dir.path(), "gdpr.md", fixtures::DOCUMENT_TEXT);

    let out = muse(&["split", &doc, "--id", fixtures::DOCUMENT_ID]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let sections: Vec<muse_artifact::Section> =
        serde_json::from_slice(&out.stdout).expect("sections json");
    assert_eq!(sections, fixtures::sections());
}

#[test]
fn derive_writes_pipeline_output() {
    let dir = tempfile::tempdir().expect("temp dir");
    let doc = write(dir.path(), "gdpr.md", fixtures::DOCUMENT_TEXT);
    let responses = write(
        dir.path(),
        "responses.json",
        &serde_json::to_string(&recorded_responses()).expect("fixture json"),
    );

    let out = muse(&[
        "derive",
        &doc,
        "--responses",
        &responses,
        "--id",
        fixtures::DOCUMENT_ID,
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let output: PipelineOutput = serde_json::from_slice(&out.stdout).expect("output json");
    assert_eq!(output.document_id, fixtures::DOCUMENT_ID);
    assert_eq!(output.epics.len(), 1);
    assert_eq!(output.features.len(), 2);
    assert_eq!(output.stories.len(), 2);
}

#[test]
fn derive_fails_on_missing_responses() {
    let dir = tempfile::tempdir().expect("temp dir");
    let doc = write(dir.path(), "gdpr.md", fixtures::DOCUMENT_TEXT);
    let responses = write(dir.path(), "responses.json", "{}");

    let out = muse(&["derive", &doc, "--responses", &responses]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("summarization failed"));
}

#[test]
fn config_prints_defaults_and_rejects_bad_files() {
    let out = muse(&["config"]);
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("failure_policy = \"fail_fast\""), "{text}");
    assert!(text.contains("max_concurrent = 4"), "{text}");

    let dir = tempfile::tempdir().expect("temp dir");
    let bad = write(dir.path(), "muse.toml", "[limiter]\nmax_concurrent = 0\n");
    let out = muse(&["config", "--config", &bad]);
    assert!(!out.status.success());
}
