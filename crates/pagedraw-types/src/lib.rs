//! Core types shared by the pagedraw crates.

pub mod filter;
pub mod page;

pub use filter::{FilterFingerprint, FilterSet};
pub use page::{FetchRequest, Item, PageResult, SearchMode};

/// Items per remote page.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// First page index whose responses are unreliable.
pub const DEFAULT_GLITCH_PAGE: u32 = 1000;

/// Page reported for a collection that reaches into the glitch region.
pub const DEFAULT_CAPPED_PAGE: u32 = 501;

/// Declared totals at or above this value are discarded.
pub const DEFAULT_TRUSTED_TOTAL_LIMIT: u64 = 9990;

/// Lowest id drawn by the random-id probe.
pub const DEFAULT_MIN_PROBE_ID: u64 = 128;

/// Probe upper bound used when the recent-items query yields no usable id.
pub const DEFAULT_FALLBACK_MAX_ID: u64 = 100_000_000;
