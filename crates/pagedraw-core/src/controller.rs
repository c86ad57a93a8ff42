//! Top-level selection controller.
//!
//! # Lifecycle
//!
//! ```text
//!  start_chaos()/start_smart()
//!    ├── guards: authenticated, no active session
//!    ├── show busy indicator, schedule Begin (deferred start)
//!    ├── Begin → pick driver (DiscoveryEngine | ChaosProbe), issue fetch
//!    ├── on_fetch_complete → driver step
//!    │     ├── Continue(delay) → schedule Issue → issue fetch
//!    │     ├── Resolved → teardown, open item detail
//!    │     └── Abort → teardown, show message
//!    └── cancel() → teardown (idempotent)
//! ```
//!
//! At most one fetch or one timer is outstanding per session. Tickets and
//! timer tokens are never reused, so a completion or firing that does not
//! match what the session awaits is a late arrival from a torn-down session
//! and is dropped.

use pagedraw_error::{AbortReason, DrawError, Result};
use pagedraw_types::{FetchRequest, SearchMode};
use tracing::{debug, error, info};

use crate::chaos::ChaosProbe;
use crate::collab::{Collaborators, FetchOutcome, FetchTicket, TimerToken};
use crate::config::ControllerConfig;
use crate::discovery::DiscoveryEngine;
use crate::random::RandomSource;
use crate::session::{Resolution, ResolutionDetail, SelectionOutcome, SessionEnv, Step};
use crate::state::SharedProcessState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Begin,
    Issue,
}

#[derive(Debug)]
enum Driver {
    Starting,
    Discovery(DiscoveryEngine),
    Chaos(ChaosProbe),
}

impl Driver {
    fn effective_mode(&self, requested: SearchMode) -> SearchMode {
        match self {
            Self::Starting => requested,
            Self::Discovery(_) => SearchMode::Smart,
            Self::Chaos(_) => SearchMode::Chaos,
        }
    }
}

#[derive(Debug)]
struct Session {
    requested: SearchMode,
    driver: Driver,
    pending_timer: Option<(TimerToken, Wake)>,
    in_flight: Option<FetchTicket>,
}

#[derive(Debug)]
pub struct SelectionController {
    config: ControllerConfig,
    state: SharedProcessState,
    rng: RandomSource,
    io: Collaborators,
    next_token: u64,
    session: Option<Session>,
    last_outcome: Option<SelectionOutcome>,
}

impl SelectionController {
    /// Validate `config` and bind it to `state`. Fails if the two disagree on
    /// the cache key.
    pub fn new(
        config: ControllerConfig,
        state: SharedProcessState,
        rng: RandomSource,
        io: Collaborators,
    ) -> Result<Self> {
        config.validate()?;
        let state_key = state.lock().cache_key().to_owned();
        if state_key != config.cache_key {
            return Err(DrawError::invalid_config(
                "cache_key",
                format!(
                    "process state flushes to `{state_key}` but the config names `{}`",
                    config.cache_key
                ),
            ));
        }
        Ok(Self {
            config,
            state,
            rng,
            io,
            next_token: 0,
            session: None,
            last_outcome: None,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Mode of the running session, after any smart-to-chaos fallback.
    #[must_use]
    pub fn active_mode(&self) -> Option<SearchMode> {
        self.session
            .as_ref()
            .map(|session| session.driver.effective_mode(session.requested))
    }

    /// Phase of the running discovery, if the session is a filtered one.
    #[must_use]
    pub fn discovery_phase(&self) -> Option<crate::discovery::Phase> {
        match &self.session.as_ref()?.driver {
            Driver::Discovery(engine) => Some(engine.phase()),
            Driver::Starting | Driver::Chaos(_) => None,
        }
    }

    #[must_use]
    pub fn last_outcome(&self) -> Option<&SelectionOutcome> {
        self.last_outcome.as_ref()
    }

    /// Start a filterless session. No-op when unauthenticated or busy.
    pub fn start_chaos(&mut self) -> bool {
        self.start(SearchMode::Chaos)
    }

    /// Start a session over the host's current filters. Falls back to chaos
    /// probing when no filter is active. No-op when unauthenticated or busy.
    pub fn start_smart(&mut self) -> bool {
        self.start(SearchMode::Smart)
    }

    /// Tear down the running session, if any. Safe to call repeatedly.
    pub fn cancel(&mut self) {
        if self.session.is_some() {
            info!("selection cancelled");
            self.teardown();
        }
    }

    /// Deliver a timer firing scheduled through the [`Scheduler`](crate::Scheduler).
    pub fn on_timer(&mut self, token: TimerToken) {
        let wake = match self.session.as_mut() {
            Some(session) => match session.pending_timer {
                Some((pending, wake)) if pending == token => {
                    session.pending_timer = None;
                    wake
                }
                _ => {
                    debug!(%token, "ignoring stale timer");
                    return;
                }
            },
            None => {
                debug!(%token, "ignoring timer with no active session");
                return;
            }
        };
        match wake {
            Wake::Begin => self.begin(),
            Wake::Issue => self.issue(),
        }
    }

    /// Deliver the result of a request issued through the
    /// [`PageFetchClient`](crate::PageFetchClient).
    pub fn on_fetch_complete(&mut self, ticket: FetchTicket, outcome: FetchOutcome) {
        let Some(session) = self.session.as_mut() else {
            debug!(%ticket, "ignoring completion with no active session");
            return;
        };
        if session.in_flight != Some(ticket) {
            debug!(%ticket, "ignoring stale completion");
            return;
        }
        session.in_flight = None;
        if let Some((token, _)) = session.pending_timer.take() {
            self.io.scheduler.cancel(token);
        }

        let mut state = self.state.lock();
        let mut env = SessionEnv {
            config: &self.config,
            state: &mut state,
            rng: &mut self.rng,
        };
        let step = match (&mut session.driver, &outcome) {
            (Driver::Discovery(engine), Ok(page)) => engine.on_page(page, &mut env),
            (Driver::Discovery(engine), Err(failure)) => engine.on_failure(&failure.detail, &mut env),
            (Driver::Chaos(probe), Ok(page)) => probe.on_page(page, &mut env),
            (Driver::Chaos(probe), Err(failure)) => probe.on_failure(&failure.detail, &env),
            (Driver::Starting, _) => Step::Idle,
        };
        drop(state);
        self.apply(step);
    }

    fn start(&mut self, mode: SearchMode) -> bool {
        if !self.io.auth.is_authenticated() {
            debug!(mode = mode.as_str(), "start ignored: not authenticated");
            return false;
        }
        if self.session.is_some() {
            debug!(mode = mode.as_str(), "start ignored: session already active");
            return false;
        }
        self.io.presenter.show_busy_indicator();
        self.session = Some(Session {
            requested: mode,
            driver: Driver::Starting,
            pending_timer: None,
            in_flight: None,
        });
        let delay = self.config.timing.start();
        self.schedule(Wake::Begin, delay);
        true
    }

    fn begin(&mut self) {
        let Some(requested) = self.session.as_ref().map(|session| session.requested) else {
            return;
        };
        let driver = match requested {
            SearchMode::Chaos => {
                info!("selection mode: chaos");
                self.chaos_driver()
            }
            SearchMode::Smart => {
                let Some(filters) = self.io.filters.current_filters() else {
                    self.abort(AbortReason::FilterUnavailable);
                    return;
                };
                if filters.is_active() {
                    let fingerprint = filters.fingerprint();
                    let mut state = self.state.lock();
                    let cached = state.cached_boundary(&fingerprint);
                    let env = SessionEnv {
                        config: &self.config,
                        state: &mut state,
                        rng: &mut self.rng,
                    };
                    info!(fingerprint = fingerprint.digest(), cached = ?cached, "selection mode: smart");
                    Driver::Discovery(DiscoveryEngine::start(filters, cached, &env))
                } else {
                    info!("smart selection without filters; switching to chaos probing");
                    self.chaos_driver()
                }
            }
        };
        if let Some(session) = self.session.as_mut() {
            session.driver = driver;
        }
        self.issue();
    }

    fn chaos_driver(&mut self) -> Driver {
        let mut state = self.state.lock();
        let env = SessionEnv {
            config: &self.config,
            state: &mut state,
            rng: &mut self.rng,
        };
        Driver::Chaos(ChaosProbe::start(&env))
    }

    fn issue(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let mut state = self.state.lock();
        let mut env = SessionEnv {
            config: &self.config,
            state: &mut state,
            rng: &mut self.rng,
        };
        let request = match &mut session.driver {
            Driver::Discovery(engine) => engine.next_request(&env),
            Driver::Chaos(probe) => Some(probe.next_request(&mut env)),
            Driver::Starting => None,
        };
        drop(state);

        let Some(request) = request else {
            debug!("driver has no request to issue; closing session");
            self.teardown();
            return;
        };
        self.next_token += 1;
        let ticket = FetchTicket(self.next_token);
        session.in_flight = Some(ticket);
        match &request {
            FetchRequest::Page { filters, page } => self.io.fetch.fetch_page(ticket, filters, *page),
            FetchRequest::ById { id } => self.io.fetch.fetch_by_id(ticket, *id),
            FetchRequest::Recent => self.io.fetch.fetch_recent(ticket),
        }
    }

    fn apply(&mut self, step: Step) {
        match step {
            Step::Continue { delay } => self.schedule(Wake::Issue, delay),
            Step::Resolved(resolution) => self.succeed(resolution),
            Step::Abort(reason) => self.abort(reason),
            Step::Idle => {
                debug!("driver already finished; closing session");
                self.teardown();
            }
        }
    }

    fn schedule(&mut self, wake: Wake, delay: std::time::Duration) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let Some((stale, _)) = session.pending_timer.take() {
            self.io.scheduler.cancel(stale);
        }
        self.next_token += 1;
        let token = TimerToken(self.next_token);
        session.pending_timer = Some((token, wake));
        debug!(%token, ?wake, delay_ms = delay.as_millis() as u64, "scheduled");
        self.io.scheduler.schedule(token, delay);
    }

    fn succeed(&mut self, resolution: Resolution) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let outcome = SelectionOutcome {
            requested: session.requested,
            effective: session.driver.effective_mode(session.requested),
            item: resolution.item,
            detail: resolution.detail,
        };
        match outcome.detail {
            ResolutionDetail::Page { page, slot, total } => info!(
                mode = outcome.effective.as_str(),
                id = outcome.item.id,
                name = %outcome.item.name,
                page = page + 1,
                slot = slot + 1,
                total,
                "item chosen"
            ),
            ResolutionDetail::Probe { id, max_id } => info!(
                mode = outcome.effective.as_str(),
                id,
                name = %outcome.item.name,
                max_id,
                "item chosen"
            ),
        }
        self.teardown();
        self.io.presenter.open_item_detail(&outcome.item);
        self.last_outcome = Some(outcome);
    }

    fn abort(&mut self, reason: AbortReason) {
        error!(kind = reason.kind(), reason = %reason, "selection aborted");
        self.teardown();
        self.io.presenter.show_abort_message(&reason.message());
    }

    fn teardown(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        if let Some((token, _)) = session.pending_timer {
            self.io.scheduler.cancel(token);
        }
        if let Some(ticket) = session.in_flight {
            self.io.fetch.release(ticket);
        }
        self.io.presenter.hide_busy_indicator();
    }
}

impl Drop for SelectionController {
    fn drop(&mut self) {
        self.cancel();
    }
}
