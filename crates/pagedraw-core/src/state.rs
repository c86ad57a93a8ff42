//! Process-scoped state shared by every controller.
//!
//! Holds the boundary cache together with its backing store, and the
//! highest item id observed through the recent-items query. Create it once at
//! process start with [`ProcessState::for_config`] (or [`ProcessState::load`]
//! with an explicit key), hand clones of the [`SharedProcessState`] handle to
//! controllers, and drop it at shutdown. Every cache mutation is flushed
//! before the mutating call returns, so teardown needs no final flush.

use std::sync::Arc;

use pagedraw_cache::{BoundaryCache, CacheStore};
use pagedraw_error::Result;
use pagedraw_types::FilterFingerprint;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::ControllerConfig;

pub type SharedProcessState = Arc<Mutex<ProcessState>>;

pub struct ProcessState {
    cache: BoundaryCache,
    store: Box<dyn CacheStore>,
    cache_key: String,
    max_observed_id: Option<u64>,
}

impl std::fmt::Debug for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessState")
            .field("cache_entries", &self.cache.len())
            .field("cache_key", &self.cache_key)
            .field("max_observed_id", &self.max_observed_id)
            .finish_non_exhaustive()
    }
}

impl ProcessState {
    /// Load the cache stored under `cache_key`. A missing entry yields an
    /// empty cache.
    pub fn load(store: Box<dyn CacheStore>, cache_key: impl Into<String>) -> Result<Self> {
        let cache_key = cache_key.into();
        let cache = store.load(&cache_key)?.unwrap_or_default();
        info!(key = %cache_key, entries = cache.len(), "boundary cache ready");
        Ok(Self {
            cache,
            store,
            cache_key,
            max_observed_id: None,
        })
    }

    /// Load the cache stored under `config.cache_key`.
    pub fn for_config(store: Box<dyn CacheStore>, config: &ControllerConfig) -> Result<Self> {
        Self::load(store, config.cache_key.clone())
    }

    /// Like [`load`](Self::load), but an unreadable store starts an empty
    /// cache instead of failing. The next flush replaces the bad payload.
    pub fn load_or_empty(store: Box<dyn CacheStore>, cache_key: impl Into<String>) -> Self {
        let cache_key = cache_key.into();
        let cache = match store.load(&cache_key) {
            Ok(loaded) => loaded.unwrap_or_default(),
            Err(err) => {
                warn!(key = %cache_key, error = %err, "boundary cache unreadable; starting empty");
                BoundaryCache::new()
            }
        };
        Self {
            cache,
            store,
            cache_key,
            max_observed_id: None,
        }
    }

    #[must_use]
    pub fn shared(self) -> SharedProcessState {
        Arc::new(Mutex::new(self))
    }

    #[must_use]
    pub fn cached_boundary(&self, fingerprint: &FilterFingerprint) -> Option<u32> {
        self.cache.get(fingerprint)
    }

    /// Overwrite the boundary for `fingerprint` and flush.
    pub fn record_boundary(&mut self, fingerprint: &FilterFingerprint, max_page: u32) {
        let previous = self.cache.insert(fingerprint.clone(), max_page);
        if previous != Some(max_page) {
            info!(
                fingerprint = fingerprint.digest(),
                max_page,
                previous = ?previous,
                "boundary cached"
            );
        }
        self.flush();
    }

    /// Drop the boundary for `fingerprint` and flush.
    pub fn invalidate(&mut self, fingerprint: &FilterFingerprint) {
        if self.cache.remove(fingerprint).is_some() {
            info!(fingerprint = fingerprint.digest(), "boundary invalidated");
        }
        self.flush();
    }

    #[must_use]
    pub fn cache(&self) -> &BoundaryCache {
        &self.cache
    }

    #[must_use]
    pub fn max_observed_id(&self) -> Option<u64> {
        self.max_observed_id
    }

    pub fn set_max_observed_id(&mut self, id: u64) {
        self.max_observed_id = Some(id);
    }

    /// Storage key every flush writes to.
    #[must_use]
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    fn flush(&self) {
        if let Err(err) = self.store.save(&self.cache_key, &self.cache) {
            warn!(key = %self.cache_key, error = %err, "boundary cache flush failed");
        }
    }
}
