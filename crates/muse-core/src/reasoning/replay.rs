//! Recorded-response client for offline runs

use super::{EpicRequest, FeatureRequest, ReasoningClient, StoryRequest};
use crate::error::ServiceError;
use async_trait::async_trait;
use muse_artifact::{Epic, Feature, Section, SectionFindings, UserStory};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key in `summaries` matching any section without its own entry
pub const ANY_SECTION: &str = "*";

/// Recorded responses, keyed by what each call is invoked for
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplayFixture {
    /// Findings by content-hash hex, or [`ANY_SECTION`]
    pub summaries: BTreeMap<String, SectionFindings>,
    /// Epic response for the document
    pub epics: Vec<Epic>,
    /// Feature responses by epic id
    pub features: BTreeMap<String, Vec<Feature>>,
    /// Story responses by feature id
    pub stories: BTreeMap<String, Vec<UserStory>>,
}

/// Serves a [`ReplayFixture`]; missing entries are malformed output
#[derive(Debug, Clone, Default)]
pub struct ReplayClient {
    fixture: ReplayFixture,
}

impl ReplayClient {
    /// Serve `fixture`
    #[must_use]
    pub fn new(fixture: ReplayFixture) -> Self {
        Self { fixture }
    }

    /// Parse a JSON fixture
    ///
    /// # Errors
    /// Returns the parse error if `json` is not a valid fixture.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json).map(Self::new)
    }

    /// Recorded responses
    #[must_use]
    pub fn fixture(&self) -> &ReplayFixture {
        &self.fixture
    }
}

fn missing(what: &str, key: &str) -> ServiceError {
    ServiceError::Malformed(format!("no recorded {what} response for {key}"))
}

#[async_trait]
impl ReasoningClient for ReplayClient {
    async fn summarize(&self, section: &Section) -> Result<SectionFindings, ServiceError> {
        let key = section.content_hash.to_string();
        self.fixture
            .summaries
            .get(&key)
            .or_else(|| self.fixture.summaries.get(ANY_SECTION))
            .cloned()
            .ok_or_else(|| missing("summary", &section.section_id))
    }

    async fn derive_epics(&self, _request: &EpicRequest) -> Result<Vec<Epic>, ServiceError> {
        Ok(self.fixture.epics.clone())
    }

    async fn derive_features(
        &self,
        request: &FeatureRequest,
    ) -> Result<Vec<Feature>, ServiceError> {
        self.fixture
            .features
            .get(&request.epic.epic_id)
            .cloned()
            .ok_or_else(|| missing("feature", &request.epic.epic_id))
    }

    async fn derive_stories(
        &self,
        request: &StoryRequest,
    ) -> Result<Vec<UserStory>, ServiceError> {
        self.fixture
            .stories
            .get(&request.feature.feature_id)
            .cloned()
            .ok_or_else(|| missing("story", &request.feature.feature_id))
    }
}
