//! Shared vocabulary of the session drivers.

use std::time::Duration;

use pagedraw_error::AbortReason;
use pagedraw_types::{Item, SearchMode};
use serde::{Deserialize, Serialize};

use crate::config::ControllerConfig;
use crate::random::RandomSource;
use crate::state::ProcessState;

/// What a driver wants after handling one completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Issue the driver's next request after `delay`.
    Continue { delay: Duration },
    Resolved(Resolution),
    Abort(AbortReason),
    /// The driver already reached a terminal phase; nothing left to do.
    Idle,
}

/// Where a resolved item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionDetail {
    /// Zero-based page and slot of the chosen global index.
    Page { page: u32, slot: u32, total: u64 },
    /// Upper bound the random id was drawn under.
    Probe { id: u64, max_id: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub item: Item,
    pub detail: ResolutionDetail,
}

/// Summary of the most recent successful session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionOutcome {
    /// Mode the host asked for.
    pub requested: SearchMode,
    /// Mode that actually ran. Smart without filters runs as chaos.
    pub effective: SearchMode,
    pub item: Item,
    pub detail: ResolutionDetail,
}

/// Borrowed context a driver needs to advance.
pub struct SessionEnv<'a> {
    pub config: &'a ControllerConfig,
    pub state: &'a mut ProcessState,
    pub rng: &'a mut RandomSource,
}
