//! Boundary cache: last discovered max-page index per filter fingerprint.
//!
//! The cache is loaded once at process start, mutated in place and flushed
//! through a [`CacheStore`] after every mutation. Values are overwritten,
//! never merged.

pub mod store;

use std::collections::BTreeMap;

use pagedraw_types::{DEFAULT_CAPPED_PAGE, DEFAULT_GLITCH_PAGE, FilterFingerprint};
use serde::{Deserialize, Serialize};

pub use store::{CacheStore, JsonFileStore, MemoryStore};

/// Mapping `fingerprint -> max page index`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoundaryCache {
    entries: BTreeMap<FilterFingerprint, u32>,
}

impl BoundaryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn get(&self, fingerprint: &FilterFingerprint) -> Option<u32> {
        self.entries.get(fingerprint).copied()
    }

    /// Store `max_page`, replacing any previous value. Returns the old value.
    pub fn insert(&mut self, fingerprint: FilterFingerprint, max_page: u32) -> Option<u32> {
        self.entries.insert(fingerprint, max_page)
    }

    pub fn remove(&mut self, fingerprint: &FilterFingerprint) -> Option<u32> {
        self.entries.remove(fingerprint)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whether a cached page value is the "unbounded" marker rather than a
/// concrete boundary: the capped page itself, or anything at or past the
/// glitch page.
#[inline]
#[must_use]
pub fn is_unbounded_marker(value: u32, capped_page: u32, glitch_page: u32) -> bool {
    value == capped_page || value >= glitch_page
}

/// [`is_unbounded_marker`] with the default paging constants.
#[inline]
#[must_use]
pub fn is_default_unbounded_marker(value: u32) -> bool {
    is_unbounded_marker(value, DEFAULT_CAPPED_PAGE, DEFAULT_GLITCH_PAGE)
}
