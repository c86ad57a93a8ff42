//! Collaborator interfaces consumed by the controller.
//!
//! Every call here is fire-and-forget. Remote completions and timer firings
//! come back through [`SelectionController::on_fetch_complete`] and
//! [`SelectionController::on_timer`], always on the controller's own thread.
//!
//! [`SelectionController::on_fetch_complete`]: crate::SelectionController::on_fetch_complete
//! [`SelectionController::on_timer`]: crate::SelectionController::on_timer

use std::fmt;
use std::time::Duration;

use pagedraw_types::{FilterSet, Item, PageResult};

/// Identifies one outstanding remote request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FetchTicket(pub(crate) u64);

impl FetchTicket {
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FetchTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fetch#{}", self.0)
    }
}

/// Identifies one scheduled wake-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(pub(crate) u64);

impl TimerToken {
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// The remote call failed. An empty page is *not* a failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{detail}")]
pub struct FetchFailure {
    pub detail: String,
}

impl FetchFailure {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

pub type FetchOutcome = std::result::Result<PageResult, FetchFailure>;

/// Asynchronous remote query bridge.
///
/// Implementations start the request and return immediately. The host later
/// reports the result with the same ticket.
pub trait PageFetchClient {
    fn fetch_page(&mut self, ticket: FetchTicket, filters: &FilterSet, page: u32);

    fn fetch_by_id(&mut self, ticket: FetchTicket, id: u64);

    fn fetch_recent(&mut self, ticket: FetchTicket);

    /// The session no longer wants `ticket`; drop or abandon it.
    fn release(&mut self, ticket: FetchTicket) {
        let _ = ticket;
    }
}

/// Delayed wake-ups.
pub trait Scheduler {
    fn schedule(&mut self, token: TimerToken, delay: Duration);

    fn cancel(&mut self, token: TimerToken);
}

/// User-facing side effects.
pub trait Presenter {
    fn show_busy_indicator(&mut self);

    fn hide_busy_indicator(&mut self);

    fn show_abort_message(&mut self, text: &str);

    fn open_item_detail(&mut self, item: &Item);
}

pub trait AuthGate {
    fn is_authenticated(&self) -> bool;
}

/// Reads the host's current search filters.
pub trait FilterSource {
    /// `None` when the host cannot build a filter set right now.
    fn current_filters(&self) -> Option<FilterSet>;
}

/// The full set of collaborators a controller drives.
pub struct Collaborators {
    pub fetch: Box<dyn PageFetchClient>,
    pub scheduler: Box<dyn Scheduler>,
    pub presenter: Box<dyn Presenter>,
    pub auth: Box<dyn AuthGate>,
    pub filters: Box<dyn FilterSource>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
