//! In-memory collaborators with a virtual clock.
//!
//! Every collaborator is a cheap handle over shared state: one clone goes into
//! the controller's [`Collaborators`], another stays with the test to script
//! responses and inspect what happened.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use pagedraw::{
    AuthGate, Collaborators, ControllerConfig, FetchFailure, FetchOutcome, FetchRequest,
    FetchTicket, FilterSet, FilterSource, Item, PageFetchClient, PageResult, Presenter,
    RandomSource, Result, Scheduler, SelectionController, SharedProcessState, TimerToken,
};
use parking_lot::Mutex;
use tracing::debug;

/// Shape of the simulated remote catalog.
#[derive(Debug, Clone)]
pub struct SimCollection {
    pub page_size: u32,
    /// Items matching the filtered query.
    pub total: u64,
    /// Pages at or past this index always come back full.
    pub glitch_from: Option<u32>,
    /// Total reported alongside every page.
    pub declared_total: Option<u64>,
    /// Id of the newest item, returned by the recent-items query.
    pub newest_id: Option<u64>,
    /// An id exists when it is a multiple of this.
    pub id_stride: u64,
    /// Pages whose fetch always fails.
    pub failing_pages: BTreeSet<u32>,
}

impl Default for SimCollection {
    fn default() -> Self {
        Self {
            page_size: 10,
            total: 0,
            glitch_from: None,
            declared_total: None,
            newest_id: None,
            id_stride: 1,
            failing_pages: BTreeSet::new(),
        }
    }
}

impl SimCollection {
    #[must_use]
    pub fn with_total(total: u64) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Id of the item at a global index of the filtered collection.
    #[must_use]
    pub fn item_id(index: u64) -> u64 {
        1_000_000 + index
    }

    fn page(&self, page: u32) -> PageResult {
        let size = u64::from(self.page_size);
        let start = u64::from(page) * size;
        let end = if self.glitch_from.is_some_and(|glitch| page >= glitch) {
            start + size
        } else {
            (start + size).min(self.total)
        };
        let items = (start..end.max(start))
            .map(|index| Item::new(Self::item_id(index), format!("item {index}")))
            .collect();
        PageResult {
            items,
            declared_total: self.declared_total,
        }
    }

    fn respond(&self, request: &FetchRequest) -> FetchOutcome {
        match request {
            FetchRequest::Page { page, .. } => {
                if self.failing_pages.contains(page) {
                    return Err(FetchFailure::new(format!("page {page} unavailable")));
                }
                Ok(self.page(*page))
            }
            FetchRequest::ById { id } => {
                if self.id_stride > 0 && id % self.id_stride == 0 {
                    Ok(PageResult::new(vec![Item::new(*id, format!("id {id}"))]))
                } else {
                    Ok(PageResult::empty())
                }
            }
            FetchRequest::Recent => Ok(PageResult::new(
                self.newest_id
                    .map(|id| vec![Item::new(id, "newest")])
                    .unwrap_or_default(),
            )),
        }
    }
}

/// One scripted response, consumed before the collection is consulted.
#[derive(Debug, Clone)]
pub enum Scripted {
    Page(PageResult),
    Fail(String),
}

#[derive(Debug, Default)]
struct RemoteInner {
    collection: SimCollection,
    scripted: VecDeque<Scripted>,
    pending: VecDeque<(FetchTicket, FetchRequest)>,
    requests: Vec<FetchRequest>,
    released: Vec<FetchTicket>,
}

#[derive(Debug, Clone, Default)]
pub struct SimRemote {
    inner: Arc<Mutex<RemoteInner>>,
}

impl SimRemote {
    #[must_use]
    pub fn new(collection: SimCollection) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RemoteInner {
                collection,
                ..RemoteInner::default()
            })),
        }
    }

    pub fn script(&self, response: Scripted) {
        self.inner.lock().scripted.push_back(response);
    }

    pub fn update_collection(&self, update: impl FnOnce(&mut SimCollection)) {
        update(&mut self.inner.lock().collection);
    }

    /// Every request issued so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.inner.lock().requests.clone()
    }

    /// Page indices of paged requests, in order.
    #[must_use]
    pub fn pages_requested(&self) -> Vec<u32> {
        self.inner
            .lock()
            .requests
            .iter()
            .filter_map(FetchRequest::page)
            .collect()
    }

    #[must_use]
    pub fn released(&self) -> Vec<FetchTicket> {
        self.inner.lock().released.clone()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Take the oldest outstanding request and compute its response.
    pub fn pop_response(&self) -> Option<(FetchTicket, FetchOutcome)> {
        let mut inner = self.inner.lock();
        let (ticket, request) = inner.pending.pop_front()?;
        let outcome = match inner.scripted.pop_front() {
            Some(Scripted::Page(page)) => Ok(page),
            Some(Scripted::Fail(detail)) => Err(FetchFailure::new(detail)),
            None => inner.collection.respond(&request),
        };
        Some((ticket, outcome))
    }

    fn submit(&mut self, ticket: FetchTicket, request: FetchRequest) {
        debug!(%ticket, ?request, "sim remote request");
        let mut inner = self.inner.lock();
        inner.requests.push(request.clone());
        inner.pending.push_back((ticket, request));
    }
}

impl PageFetchClient for SimRemote {
    fn fetch_page(&mut self, ticket: FetchTicket, filters: &FilterSet, page: u32) {
        self.submit(
            ticket,
            FetchRequest::Page {
                filters: filters.clone(),
                page,
            },
        );
    }

    fn fetch_by_id(&mut self, ticket: FetchTicket, id: u64) {
        self.submit(ticket, FetchRequest::ById { id });
    }

    fn fetch_recent(&mut self, ticket: FetchTicket) {
        self.submit(ticket, FetchRequest::Recent);
    }

    fn release(&mut self, ticket: FetchTicket) {
        let mut inner = self.inner.lock();
        inner.pending.retain(|(pending, _)| *pending != ticket);
        inner.released.push(ticket);
    }
}

#[derive(Debug, Default)]
struct SchedulerInner {
    now: Duration,
    timers: Vec<(Duration, TimerToken)>,
    delays: Vec<Duration>,
    cancelled: Vec<TimerToken>,
}

/// Virtual-clock scheduler. Timers fire only when the test pops them.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    inner: Arc<Mutex<SchedulerInner>>,
}

impl ManualScheduler {
    #[must_use]
    pub fn now(&self) -> Duration {
        self.inner.lock().now
    }

    /// Every delay ever scheduled, in order.
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        self.inner.lock().delays.clone()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.lock().timers.len()
    }

    #[must_use]
    pub fn cancelled(&self) -> Vec<TimerToken> {
        self.inner.lock().cancelled.clone()
    }

    /// Remove the earliest timer and advance the clock to its deadline.
    pub fn pop_due(&self) -> Option<TimerToken> {
        let mut inner = self.inner.lock();
        let (idx, _) = inner
            .timers
            .iter()
            .enumerate()
            .min_by_key(|(_, (due, token))| (*due, *token))?;
        let (due, token) = inner.timers.remove(idx);
        inner.now = inner.now.max(due);
        Some(token)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, token: TimerToken, delay: Duration) {
        let mut inner = self.inner.lock();
        let due = inner.now + delay;
        inner.timers.push((due, token));
        inner.delays.push(delay);
    }

    fn cancel(&mut self, token: TimerToken) {
        let mut inner = self.inner.lock();
        let before = inner.timers.len();
        inner.timers.retain(|(_, pending)| *pending != token);
        if inner.timers.len() != before {
            inner.cancelled.push(token);
        }
    }
}

#[derive(Debug, Default)]
struct PresenterInner {
    busy: bool,
    busy_shown: u32,
    messages: Vec<String>,
    opened: Vec<Item>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingPresenter {
    inner: Arc<Mutex<PresenterInner>>,
}

impl RecordingPresenter {
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.inner.lock().busy
    }

    #[must_use]
    pub fn busy_shown(&self) -> u32 {
        self.inner.lock().busy_shown
    }

    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.inner.lock().messages.clone()
    }

    #[must_use]
    pub fn opened(&self) -> Vec<Item> {
        self.inner.lock().opened.clone()
    }
}

impl Presenter for RecordingPresenter {
    fn show_busy_indicator(&mut self) {
        let mut inner = self.inner.lock();
        inner.busy = true;
        inner.busy_shown += 1;
    }

    fn hide_busy_indicator(&mut self) {
        self.inner.lock().busy = false;
    }

    fn show_abort_message(&mut self, text: &str) {
        self.inner.lock().messages.push(text.to_owned());
    }

    fn open_item_detail(&mut self, item: &Item) {
        self.inner.lock().opened.push(item.clone());
    }
}

#[derive(Debug, Clone)]
pub struct SharedAuth(Arc<Mutex<bool>>);

impl SharedAuth {
    #[must_use]
    pub fn new(authenticated: bool) -> Self {
        Self(Arc::new(Mutex::new(authenticated)))
    }

    pub fn set(&self, authenticated: bool) {
        *self.0.lock() = authenticated;
    }
}

impl AuthGate for SharedAuth {
    fn is_authenticated(&self) -> bool {
        *self.0.lock()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SharedFilters(Arc<Mutex<Option<FilterSet>>>);

impl SharedFilters {
    pub fn set(&self, filters: Option<FilterSet>) {
        *self.0.lock() = filters;
    }
}

impl FilterSource for SharedFilters {
    fn current_filters(&self) -> Option<FilterSet> {
        self.0.lock().clone()
    }
}

/// What a [`SimHost::run`] pump did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub completions: u32,
    pub timers: u32,
    /// The event budget ran out before the system went idle.
    pub exhausted: bool,
}

/// Test-side handles to every simulated collaborator.
#[derive(Debug, Clone)]
pub struct SimHost {
    pub remote: SimRemote,
    pub scheduler: ManualScheduler,
    pub presenter: RecordingPresenter,
    pub auth: SharedAuth,
    pub filters: SharedFilters,
}

impl SimHost {
    #[must_use]
    pub fn new(collection: SimCollection) -> Self {
        Self {
            remote: SimRemote::new(collection),
            scheduler: ManualScheduler::default(),
            presenter: RecordingPresenter::default(),
            auth: SharedAuth::new(true),
            filters: SharedFilters::default(),
        }
    }

    #[must_use]
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            fetch: Box::new(self.remote.clone()),
            scheduler: Box::new(self.scheduler.clone()),
            presenter: Box::new(self.presenter.clone()),
            auth: Box::new(self.auth.clone()),
            filters: Box::new(self.filters.clone()),
        }
    }

    pub fn controller(
        &self,
        config: ControllerConfig,
        state: SharedProcessState,
        seed: u64,
    ) -> Result<SelectionController> {
        SelectionController::new(
            config,
            state,
            RandomSource::derived(seed, "selection"),
            self.collaborators(),
        )
    }

    /// Deliver one event: a pending completion first, else the next timer.
    pub fn step(&self, controller: &mut SelectionController) -> Option<RunReport> {
        if let Some((ticket, outcome)) = self.remote.pop_response() {
            controller.on_fetch_complete(ticket, outcome);
            return Some(RunReport {
                completions: 1,
                ..RunReport::default()
            });
        }
        let token = self.scheduler.pop_due()?;
        controller.on_timer(token);
        Some(RunReport {
            timers: 1,
            ..RunReport::default()
        })
    }

    /// Pump events until nothing is pending or `budget` events were handled.
    pub fn run(&self, controller: &mut SelectionController, budget: u32) -> RunReport {
        let mut report = RunReport::default();
        for _ in 0..budget {
            match self.step(controller) {
                Some(event) => {
                    report.completions += event.completions;
                    report.timers += event.timers;
                }
                None => return report,
            }
        }
        report.exhausted = self.remote.pending_count() > 0 || self.scheduler.pending_count() > 0;
        report
    }
}
