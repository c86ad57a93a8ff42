//! Search filters and the stable cache key derived from them.

use std::fmt;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

/// Official song ids at or below this value mean "no song filter".
const DEFAULT_SONG_ID: u32 = 1;

/// Filter criteria applied to the remote paged query.
///
/// Mirrors the fields the host's search screen exposes. `difficulty` and
/// `length` hold the host's comma-separated code lists; `None` means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSet {
    pub difficulty: Option<String>,
    pub length: Option<String>,
    pub star: bool,
    pub no_star: bool,
    pub completed: bool,
    pub uncompleted: bool,
    pub featured: bool,
    pub epic: bool,
    pub legendary: bool,
    pub mythic: bool,
    pub song_id: u32,
    pub custom_song: bool,
    pub query: String,
}

impl FilterSet {
    /// Whether a song constraint narrows the result set.
    #[must_use]
    pub fn song_filter_active(&self) -> bool {
        self.custom_song || self.song_id > DEFAULT_SONG_ID
    }

    /// Whether any criterion narrows the collection.
    ///
    /// An inactive filter set means the whole remote catalog, which is
    /// sampled by id probing instead of page discovery.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.star
            || self.no_star
            || self.difficulty.as_deref().is_some_and(|d| !d.is_empty())
            || self.length.as_deref().is_some_and(|l| !l.is_empty())
            || self.completed
            || self.uncompleted
            || self.featured
            || self.epic
            || self.legendary
            || self.mythic
            || self.song_filter_active()
            || !self.query.is_empty()
    }

    /// Derive the cache key for this filter set. Pure and total.
    #[must_use]
    pub fn fingerprint(&self) -> FilterFingerprint {
        FilterFingerprint::compute(self)
    }
}

/// Order-stable key identifying the remote collection a [`FilterSet`] selects.
///
/// The encoding is a fixed sequence of `name:value` segments joined by `_`,
/// so identical filters always produce byte-identical keys across runs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterFingerprint(String);

impl FilterFingerprint {
    #[must_use]
    pub fn compute(filters: &FilterSet) -> Self {
        let mut key = String::with_capacity(96 + filters.query.len());
        let _ = write!(
            key,
            "diff:{}_len:{}_star:{}_nostar:{}_done:{}_undone:{}_feat:{}_epic:{}_leg:{}_myth:{}_song:{}_custom:{}",
            filters.difficulty.as_deref().unwrap_or("-"),
            filters.length.as_deref().unwrap_or("-"),
            u8::from(filters.star),
            u8::from(filters.no_star),
            u8::from(filters.completed),
            u8::from(filters.uncompleted),
            u8::from(filters.featured),
            u8::from(filters.epic),
            u8::from(filters.legendary),
            u8::from(filters.mythic),
            filters.song_id,
            u8::from(filters.custom_song),
        );
        if !filters.query.is_empty() {
            key.push_str("_q:");
            key.push_str(&filters.query);
        }
        Self(key)
    }

    /// Wrap a key read back from storage.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compact 64-bit digest, used as a log field.
    #[must_use]
    pub fn digest(&self) -> u64 {
        xxh3_64(self.0.as_bytes())
    }
}

impl fmt::Display for FilterFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
