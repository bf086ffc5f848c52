//! Muse Ingest
//!
//! The two leaf components of the derivation pipeline.
//!
//! - **Sectioner**: split converted document text into ordered sections with
//!   stable ids
//! - **SummaryCache**: content-addressed, append-only store of section
//!   summaries with an injectable backing store
//!
//! # Architecture
//!
//! ```text
//! Document → Sectioner → [Section] → (summarizer) → SummaryCache
//!                                         ↑______________↓
//!                                      hit: reuse / miss: compute
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use muse_ingest::{Sectioner, SummaryCache};
//!
//! let sections = Sectioner::new().split(&document)?;
//! let cache = SummaryCache::in_memory();
//! if let Some(summary) = cache.get(&sections[0].content_hash).await {
//!     // reuse
//! }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod cache;
pub mod error;
pub mod sectioner;

pub use cache::{
    BoundedStore, CacheBackend, CacheConfig, CacheStats, InMemoryStore, SummaryCache,
    SummaryStore,
};
pub use error::{CacheError, InputError};
pub use sectioner::{Sectioner, SectionerConfig, PREAMBLE_TITLE};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
