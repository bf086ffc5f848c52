//! Content-addressed summary cache
//!
//! Maps a section's content hash to its summary. Entries are append-only:
//! re-inserting an identical summary is a no-op, inserting a different one
//! is a [`CacheError::Consistency`].
//!
//! The backing store is injectable through [`SummaryStore`]:
//! - [`InMemoryStore`]: unbounded `DashMap`, never evicts
//! - [`BoundedStore`]: moka cache with capacity and optional TTL; evicted
//!   entries are simply recomputed, so the conflict check only sees
//!   resident entries

use crate::error::CacheError;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use moka::future::Cache;
use muse_artifact::{ContentHash, SectionSummary};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Key-value backing store for summaries
#[async_trait]
pub trait SummaryStore: Send + Sync + Debug {
    /// Look up a summary by content hash
    async fn get(&self, hash: &ContentHash) -> Option<SectionSummary>;

    /// Insert unless the key is present.
    ///
    /// Returns the existing value when the key was already occupied, in
    /// which case nothing is written. Must be atomic with respect to
    /// concurrent inserts of the same key.
    async fn insert_if_absent(
        &self,
        hash: ContentHash,
        summary: SectionSummary,
    ) -> Option<SectionSummary>;

    /// Approximate number of entries
    fn len(&self) -> u64;

    /// Whether the store holds no entries
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unbounded in-process store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: DashMap<ContentHash, SectionSummary>,
}

impl InMemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SummaryStore for InMemoryStore {
    async fn get(&self, hash: &ContentHash) -> Option<SectionSummary> {
        self.entries.get(hash).map(|entry| entry.value().clone())
    }

    async fn insert_if_absent(
        &self,
        hash: ContentHash,
        summary: SectionSummary,
    ) -> Option<SectionSummary> {
        match self.entries.entry(hash) {
            Entry::Occupied(existing) => Some(existing.get().clone()),
            Entry::Vacant(slot) => {
                slot.insert(summary);
                None
            }
        }
    }

    fn len(&self) -> u64 {
        self.entries.len() as u64
    }
}

/// Capacity-bounded store backed by moka
#[derive(Debug, Clone)]
pub struct BoundedStore {
    inner: Cache<ContentHash, Arc<SectionSummary>>,
}

impl BoundedStore {
    /// Create store holding at most `max_capacity` summaries
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
        }
    }

    /// Create store with time-based expiration
    #[inline]
    #[must_use]
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }
}

#[async_trait]
impl SummaryStore for BoundedStore {
    async fn get(&self, hash: &ContentHash) -> Option<SectionSummary> {
        self.inner.get(hash).await.map(|arc| (*arc).clone())
    }

    async fn insert_if_absent(
        &self,
        hash: ContentHash,
        summary: SectionSummary,
    ) -> Option<SectionSummary> {
        let entry = self.inner.entry(hash).or_insert(Arc::new(summary)).await;
        if entry.is_fresh() {
            None
        } else {
            Some((*entry.into_value()).clone())
        }
    }

    fn len(&self) -> u64 {
        self.inner.entry_count()
    }
}

/// Which backing store to build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheBackend {
    /// Unbounded, never evicts
    InMemory,
    /// moka with capacity and optional TTL
    Bounded {
        /// Most summaries kept
        capacity: u64,
        /// Seconds an entry lives after insertion
        #[serde(default)]
        ttl_secs: Option<u64>,
    },
}

/// Cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Store behind the cache
    pub backend: CacheBackend,
    /// Surface consistency violations as errors (otherwise log and keep
    /// the existing entry)
    pub strict: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::InMemory,
            strict: true,
        }
    }
}

/// Statistics for cache monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries in the store
    pub entries: u64,
    /// Lookups that found a summary
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Rejected conflicting inserts
    pub conflicts: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    conflicts: AtomicU64,
}

/// Content-addressed summary cache
///
/// Cheap to clone; clones share the store and counters.
#[derive(Debug, Clone)]
pub struct SummaryCache {
    store: Arc<dyn SummaryStore>,
    counters: Arc<Counters>,
}

impl SummaryCache {
    /// Wrap an existing store
    #[must_use]
    pub fn new(store: Arc<dyn SummaryStore>) -> Self {
        Self {
            store,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Unbounded in-memory cache
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    /// Build the configured backend
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        match config.backend {
            CacheBackend::InMemory => Self::in_memory(),
            CacheBackend::Bounded {
                capacity,
                ttl_secs: None,
            } => Self::new(Arc::new(BoundedStore::new(capacity))),
            CacheBackend::Bounded {
                capacity,
                ttl_secs: Some(ttl),
            } => Self::new(Arc::new(BoundedStore::with_ttl(
                capacity,
                Duration::from_secs(ttl),
            ))),
        }
    }

    /// Look up a summary
    pub async fn get(&self, hash: &ContentHash) -> Option<SectionSummary> {
        let found = self.store.get(hash).await;
        if found.is_some() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(hash = %hash.short(), "Summary cache hit");
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(hash = %hash.short(), "Summary cache miss");
        }
        found
    }

    /// Store a summary under its content hash
    ///
    /// Idempotent for identical content; the bound `section_id` is not part
    /// of identity since equal content at different positions shares one
    /// entry.
    ///
    /// # Errors
    /// - [`CacheError::KeyMismatch`] if `hash` is not the summary's own hash
    /// - [`CacheError::Consistency`] if a different summary is cached
    pub async fn put(&self, hash: ContentHash, summary: SectionSummary) -> Result<(), CacheError> {
        if summary.content_hash != hash {
            return Err(CacheError::KeyMismatch {
                key: hash,
                actual: summary.content_hash,
                section_id: summary.section_id,
            });
        }

        match self.store.insert_if_absent(hash, summary.clone()).await {
            None => Ok(()),
            Some(existing) if existing.same_content(&summary) => Ok(()),
            Some(existing) => {
                self.counters.conflicts.fetch_add(1, Ordering::Relaxed);
                Err(CacheError::Consistency {
                    hash,
                    existing_section: existing.section_id,
                    incoming_section: summary.section_id,
                })
            }
        }
    }

    /// Current statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.store.len(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            conflicts: self.counters.conflicts.load(Ordering::Relaxed),
        }
    }
}

impl Default for SummaryCache {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(section_id: &str, text: &str, obligation: &str) -> SectionSummary {
        SectionSummary {
            section_id: section_id.to_string(),
            content_hash: ContentHash::compute(text.as_bytes()),
            obligations: vec![obligation.to_string()],
            actors: vec!["Data Protection Officer".into()],
            constraints: vec![],
            references: vec![],
        }
    }

    #[tokio::test]
    async fn get_returns_none_for_missing() {
        let cache = SummaryCache::in_memory();
        assert!(cache.get(&ContentHash::compute(b"missing")).await.is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn put_then_get() {
        let cache = SummaryCache::in_memory();
        let s = summary("sec-0000-a", "body", "Keep records");
        cache.put(s.content_hash, s.clone()).await.unwrap();

        assert_eq!(cache.get(&s.content_hash).await, Some(s));
        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn identical_put_is_noop() {
        let cache = SummaryCache::in_memory();
        let s = summary("sec-0000-a", "body", "Keep records");
        cache.put(s.content_hash, s.clone()).await.unwrap();
        cache.put(s.content_hash, s.clone()).await.unwrap();

        // Same content bound to another section is still identical
        let moved = s.rebind("sec-0009-b");
        cache.put(s.content_hash, moved).await.unwrap();

        assert_eq!(cache.stats().entries, 1);
        assert_eq!(cache.get(&s.content_hash).await.unwrap().section_id, "sec-0000-a");
    }

    #[tokio::test]
    async fn different_put_is_consistency_error() {
        let cache = SummaryCache::in_memory();
        let first = summary("sec-0000-a", "body", "Keep records");
        let second = summary("sec-0004-b", "body", "Delete records");
        cache.put(first.content_hash, first.clone()).await.unwrap();

        let result = cache.put(second.content_hash, second).await;
        assert!(matches!(result, Err(CacheError::Consistency { .. })));
        assert_eq!(cache.get(&first.content_hash).await, Some(first));
        assert_eq!(cache.stats().conflicts, 1);
    }

    #[tokio::test]
    async fn put_rejects_foreign_key() {
        let cache = SummaryCache::in_memory();
        let s = summary("sec-0000-a", "body", "Keep records");
        let result = cache.put(ContentHash::compute(b"other"), s).await;
        assert!(matches!(result, Err(CacheError::KeyMismatch { .. })));
    }

    #[tokio::test]
    async fn bounded_store_enforces_same_invariant() {
        let cache = SummaryCache::from_config(&CacheConfig {
            backend: CacheBackend::Bounded {
                capacity: 100,
                ttl_secs: Some(60),
            },
            strict: true,
        });
        let first = summary("sec-0000-a", "body", "Keep records");
        let second = summary("sec-0004-b", "body", "Delete records");

        cache.put(first.content_hash, first.clone()).await.unwrap();
        cache.put(first.content_hash, first.clone()).await.unwrap();
        assert!(matches!(
            cache.put(second.content_hash, second).await,
            Err(CacheError::Consistency { .. })
        ));
        assert_eq!(cache.get(&first.content_hash).await, Some(first));
    }

    #[tokio::test]
    async fn concurrent_conflicting_puts_keep_one_winner() {
        let cache = SummaryCache::in_memory();
        let puts = (0..16).map(|i| {
            let cache = cache.clone();
            let s = summary(&format!("sec-{i:04}-x"), "body", &format!("Obligation {i}"));
            async move { cache.put(s.content_hash, s).await }
        });
        let results = futures::future::join_all(puts).await;

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(cache.stats().conflicts, 15);
    }

    #[test]
    fn config_parses_tagged_backend() {
        let config: CacheConfig = serde_json::from_str(
            r#"{"backend": {"kind": "bounded", "capacity": 500}, "strict": false}"#,
        )
        .unwrap();
        assert_eq!(
            config.backend,
            CacheBackend::Bounded {
                capacity: 500,
                ttl_secs: None
            }
        );
        assert!(!config.strict);
    }
}
