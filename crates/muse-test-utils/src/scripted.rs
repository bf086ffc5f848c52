//! Reasoning client driven by scripts, falling back to valid fixtures

use crate::fixtures;
use async_trait::async_trait;
use muse_artifact::{Epic, Feature, Section, SectionFindings, UserStory};
use muse_core::{EpicRequest, FeatureRequest, ReasoningClient, ServiceError, StoryRequest};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Script key matching any input
pub const ANY: &str = "*";

/// Reasoning operations, for call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Summarize,
    Epics,
    Features,
    Stories,
}

type Response<T> = Result<T, ServiceError>;

#[derive(Debug)]
struct Script<T> {
    queues: Mutex<HashMap<String, VecDeque<Response<T>>>>,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> Script<T> {
    fn push(&self, key: &str, response: Response<T>) {
        self.queues
            .lock()
            .entry(key.to_string())
            .or_default()
            .push_back(response);
    }

    /// Next scripted response for `key`, then for [`ANY`]
    fn next(&self, key: &str) -> Option<Response<T>> {
        let mut queues = self.queues.lock();
        [key, ANY]
            .into_iter()
            .find_map(|k| queues.get_mut(k).and_then(VecDeque::pop_front))
    }
}

/// Decrements the in-flight count when a call ends or is dropped
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Test double for the reasoning service
///
/// Unscripted calls answer with valid fixture batches sized by
/// [`with_epics`](Self::with_epics) and friends. Scripted responses are
/// keyed by input id (section, document, epic or feature id) or [`ANY`] and
/// are consumed in order.
#[derive(Debug)]
pub struct ScriptedReasoningClient {
    epics: usize,
    features: usize,
    stories: usize,
    latency: Option<Duration>,
    hang: Option<Operation>,
    calls: Mutex<HashMap<Operation, usize>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    summaries: Script<SectionFindings>,
    epic_script: Script<Vec<Epic>>,
    feature_script: Script<Vec<Feature>>,
    story_script: Script<Vec<UserStory>>,
}

impl Default for ScriptedReasoningClient {
    fn default() -> Self {
        Self {
            epics: 1,
            features: 2,
            stories: 2,
            latency: None,
            hang: None,
            calls: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            summaries: Script::default(),
            epic_script: Script::default(),
            feature_script: Script::default(),
            story_script: Script::default(),
        }
    }
}

impl ScriptedReasoningClient {
    /// One epic, two features per epic, two stories per feature
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_epics(mut self, n: usize) -> Self {
        self.epics = n;
        self
    }

    pub fn with_features(mut self, n: usize) -> Self {
        self.features = n;
        self
    }

    pub fn with_stories(mut self, n: usize) -> Self {
        self.stories = n;
        self
    }

    /// Sleep this long inside every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Calls of `operation` never complete
    pub fn hang_on(mut self, operation: Operation) -> Self {
        self.hang = Some(operation);
        self
    }

    pub fn push_summary(&self, section_id: &str, response: Response<SectionFindings>) {
        self.summaries.push(section_id, response);
    }

    pub fn push_epics(&self, document_id: &str, response: Response<Vec<Epic>>) {
        self.epic_script.push(document_id, response);
    }

    pub fn push_features(&self, epic_id: &str, response: Response<Vec<Feature>>) {
        self.feature_script.push(epic_id, response);
    }

    pub fn push_stories(&self, feature_id: &str, response: Response<Vec<UserStory>>) {
        self.story_script.push(feature_id, response);
    }

    /// Calls started for `operation`
    pub fn calls(&self, operation: Operation) -> usize {
        self.calls.lock().get(&operation).copied().unwrap_or(0)
    }

    /// Calls started across all operations
    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    /// Most calls observed in progress at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn enter(&self, operation: Operation) -> InFlight<'_> {
        *self.calls.lock().entry(operation).or_default() += 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);

        if self.hang == Some(operation) {
            futures::future::pending::<()>().await;
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        guard
    }
}

#[async_trait]
impl ReasoningClient for ScriptedReasoningClient {
    async fn summarize(&self, section: &Section) -> Result<SectionFindings, ServiceError> {
        let _call = self.enter(Operation::Summarize).await;
        self.summaries
            .next(&section.section_id)
            .unwrap_or_else(|| Ok(fixtures::findings_for(section)))
    }

    async fn derive_epics(&self, request: &EpicRequest) -> Result<Vec<Epic>, ServiceError> {
        let _call = self.enter(Operation::Epics).await;
        self.epic_script.next(&request.document_id).unwrap_or_else(|| {
            Ok(fixtures::epics(
                &request.document_id,
                self.epics,
                &request.summaries,
            ))
        })
    }

    async fn derive_features(&self, request: &FeatureRequest) -> Result<Vec<Feature>, ServiceError> {
        let _call = self.enter(Operation::Features).await;
        self.feature_script
            .next(&request.epic.epic_id)
            .unwrap_or_else(|| Ok(fixtures::features(&request.epic, self.features, &request.summaries)))
    }

    async fn derive_stories(&self, request: &StoryRequest) -> Result<Vec<UserStory>, ServiceError> {
        let _call = self.enter(Operation::Stories).await;
        self.story_script
            .next(&request.feature.feature_id)
            .unwrap_or_else(|| Ok(fixtures::stories(&request.feature, self.stories, &request.summaries)))
    }
}
