//! Controller configuration.
//!
//! Defaults reproduce the remote's observed behavior (10 items per page,
//! unreliable pages from 1000 on). Hosts may override any field from TOML:
//!
//! ```toml
//! max_retries = 3
//!
//! [timing]
//! retry_ms = 2000
//! ```

use std::time::Duration;

use pagedraw_error::{DrawError, Result};
use pagedraw_types::{
    DEFAULT_CAPPED_PAGE, DEFAULT_FALLBACK_MAX_ID, DEFAULT_GLITCH_PAGE, DEFAULT_MIN_PROBE_ID,
    DEFAULT_PAGE_SIZE, DEFAULT_TRUSTED_TOTAL_LIMIT,
};
use serde::{Deserialize, Serialize};

/// Fixed backoff steps, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timing {
    /// Delay between a start request and the session's first fetch.
    pub start_ms: u64,
    /// Delay before fetching the page that holds the chosen index.
    pub resolve_ms: u64,
    /// Phase advance and soft retries.
    pub soft_ms: u64,
    /// Bracket-narrowing steps.
    pub search_ms: u64,
    /// Capped generic retries after a transport failure.
    pub retry_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            start_ms: 0,
            resolve_ms: 100,
            soft_ms: 500,
            search_ms: 750,
            retry_ms: 1000,
        }
    }
}

impl Timing {
    #[must_use]
    pub fn start(&self) -> Duration {
        Duration::from_millis(self.start_ms)
    }

    #[must_use]
    pub fn resolve(&self) -> Duration {
        Duration::from_millis(self.resolve_ms)
    }

    #[must_use]
    pub fn soft(&self) -> Duration {
        Duration::from_millis(self.soft_ms)
    }

    #[must_use]
    pub fn search(&self) -> Duration {
        Duration::from_millis(self.search_ms)
    }

    #[must_use]
    pub fn retry(&self) -> Duration {
        Duration::from_millis(self.retry_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    pub page_size: u32,
    /// Probed to detect collections that overflow the remote's paging.
    pub glitch_page: u32,
    /// Boundary reported for an unbounded collection.
    pub capped_page: u32,
    pub capped_count: u32,
    /// Declared totals at or above this are ignored.
    pub trusted_total_limit: u64,
    /// Generic transport retries tolerated per smart session.
    pub max_retries: u32,
    /// Step-backs allowed when the converged boundary page comes back empty.
    pub max_backtracks: u32,
    pub min_probe_id: u64,
    pub fallback_max_id: u64,
    /// Storage key of the boundary cache.
    pub cache_key: String,
    pub timing: Timing,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            glitch_page: DEFAULT_GLITCH_PAGE,
            capped_page: DEFAULT_CAPPED_PAGE,
            capped_count: DEFAULT_PAGE_SIZE,
            trusted_total_limit: DEFAULT_TRUSTED_TOTAL_LIMIT,
            max_retries: 5,
            max_backtracks: 16,
            min_probe_id: DEFAULT_MIN_PROBE_ID,
            fallback_max_id: DEFAULT_FALLBACK_MAX_ID,
            cache_key: "filter_cache".to_owned(),
            timing: Timing::default(),
        }
    }
}

impl ControllerConfig {
    /// Parse and validate a TOML document. Missing fields take defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|err| DrawError::invalid_config("<toml>", err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(DrawError::invalid_config("page_size", "must be > 0"));
        }
        if self.glitch_page == 0 {
            return Err(DrawError::invalid_config("glitch_page", "must be > 0"));
        }
        if self.capped_page >= self.glitch_page {
            return Err(DrawError::invalid_config(
                "capped_page",
                format!("must be below glitch_page ({})", self.glitch_page),
            ));
        }
        if self.capped_count == 0 || self.capped_count > self.page_size {
            return Err(DrawError::invalid_config(
                "capped_count",
                format!("must be in 1..={}", self.page_size),
            ));
        }
        if self.min_probe_id == 0 {
            return Err(DrawError::invalid_config("min_probe_id", "must be > 0"));
        }
        if self.cache_key.is_empty() {
            return Err(DrawError::invalid_config("cache_key", "must be non-empty"));
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub(crate) fn page_len(&self) -> usize {
        self.page_size as usize
    }
}
