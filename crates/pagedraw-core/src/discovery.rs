//! Boundary discovery over a filtered, paged remote collection.
//!
//! The remote only answers "give me page N" (fixed page size) plus a total
//! hint that is often wrong. The engine finds the last non-empty page and its
//! item count with as few round trips as it can, then picks a uniform global
//! index and fetches the page that holds it.
//!
//! # Phases
//!
//! ```text
//!  no cache ──► CheckTotal ──trusted total──────────────────────┐
//!                   │                                          │
//!                   └──► GlitchCheck ──page 1000 full──► capped │
//!  cache=cap ───────────────┘   │                              │
//!                               └──► BinarySearch ──► CalcExact ┤
//!  cache=v ──► CachePeek ──full──► CacheNext ──full──┘          │
//!                  │ empty──────────────────────────┘          ▼
//!                  └─────────partial────────────────────► FetchTarget
//! ```
//!
//! Each call to [`DiscoveryEngine::on_page`] / [`DiscoveryEngine::on_failure`]
//! handles exactly one completion and yields at most one follow-up request.

use std::fmt;

use pagedraw_cache::is_unbounded_marker;
use pagedraw_error::AbortReason;
use pagedraw_types::{FetchRequest, FilterFingerprint, FilterSet, PageResult};
use tracing::{debug, info, warn};

use crate::session::{Resolution, ResolutionDetail, SessionEnv, Step};

/// Discovery state. Brackets and targets live inside the phase that uses them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Probe page 0; a small declared total short-circuits everything.
    CheckTotal,
    /// Probe the cached boundary page directly.
    CachePeek { cached: u32 },
    /// Cached page was full; probe the one after it.
    CacheNext { cached: u32 },
    /// Probe the glitch page to tell finite from unbounded collections.
    GlitchCheck,
    /// `low` is known non-empty, `high` known empty (or unverified cap).
    BinarySearch { low: u32, high: u32 },
    /// Re-fetch the converged boundary page for its exact item count.
    CalcExact { page: u32, backtracks: u32 },
    /// Fetch the page holding the chosen global index out of `total`.
    FetchTarget { page: u32, slot: u32, total: u64 },
    Done,
    Aborted,
}

impl Phase {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CheckTotal => "check_total",
            Self::CachePeek { .. } => "cache_peek",
            Self::CacheNext { .. } => "cache_next",
            Self::GlitchCheck => "glitch_check",
            Self::BinarySearch { .. } => "binary_search",
            Self::CalcExact { .. } => "calc_exact",
            Self::FetchTarget { .. } => "fetch_target",
            Self::Done => "done",
            Self::Aborted => "aborted",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Midpoint probe of a binary-search bracket.
#[inline]
#[must_use]
pub const fn bracket_mid(low: u32, high: u32) -> u32 {
    low + high.saturating_sub(low) / 2
}

/// Boundary implied by a declared total: `(max_page, count_on_max_page)`.
#[must_use]
pub fn boundary_from_total(total: u64, page_size: u32) -> Option<(u32, u32)> {
    if total == 0 || page_size == 0 {
        return None;
    }
    let size = u64::from(page_size);
    let max_page = u32::try_from((total - 1) / size).ok()?;
    let last_count = ((total - 1) % size + 1) as u32;
    Some((max_page, last_count))
}

/// Split a global index into `(page, slot)`.
#[inline]
#[must_use]
pub fn locate(global_index: u64, page_size: u32) -> (u32, u32) {
    let size = u64::from(page_size.max(1));
    ((global_index / size) as u32, (global_index % size) as u32)
}

/// One filtered discovery attempt.
#[derive(Debug, Clone)]
pub struct DiscoveryEngine {
    filters: FilterSet,
    fingerprint: FilterFingerprint,
    using_filters: bool,
    phase: Phase,
    retry_count: u32,
}

impl DiscoveryEngine {
    /// Pick the entry phase from the cached boundary, if any.
    ///
    /// - no entry: `CheckTotal`
    /// - unbounded marker: `GlitchCheck`, re-verifying the overflow instead
    ///   of trusting a stale cap
    /// - concrete page: `CachePeek`
    #[must_use]
    pub fn start(filters: FilterSet, cached: Option<u32>, env: &SessionEnv<'_>) -> Self {
        let fingerprint = filters.fingerprint();
        let using_filters = filters.is_active();
        let phase = match cached {
            None => {
                info!(fingerprint = fingerprint.digest(), "cache miss; fresh discovery");
                Phase::CheckTotal
            }
            Some(page)
                if is_unbounded_marker(page, env.config.capped_page, env.config.glitch_page) =>
            {
                info!(cached = page, "cached boundary is the unbounded marker; re-checking glitch page");
                Phase::GlitchCheck
            }
            Some(page) => {
                info!(cached = page, "cache hit; peeking cached page");
                Phase::CachePeek { cached: page }
            }
        };
        Self {
            filters,
            fingerprint,
            using_filters,
            phase,
            retry_count: 0,
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn fingerprint(&self) -> &FilterFingerprint {
        &self.fingerprint
    }

    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Page the current phase probes, `None` once terminal.
    #[must_use]
    pub fn probe_page(&self, glitch_page: u32) -> Option<u32> {
        match self.phase {
            Phase::CheckTotal => Some(0),
            Phase::CachePeek { cached } => Some(cached),
            Phase::CacheNext { cached } => Some(cached.saturating_add(1)),
            Phase::GlitchCheck => Some(glitch_page),
            Phase::BinarySearch { low, high } => Some(bracket_mid(low, high)),
            Phase::CalcExact { page, .. } | Phase::FetchTarget { page, .. } => Some(page),
            Phase::Done | Phase::Aborted => None,
        }
    }

    #[must_use]
    pub fn next_request(&self, env: &SessionEnv<'_>) -> Option<FetchRequest> {
        let page = self.probe_page(env.config.glitch_page)?;
        info!(phase = %self.phase, page, "probing page");
        Some(FetchRequest::Page {
            filters: self.filters.clone(),
            page,
        })
    }

    /// Handle a successful response for the current phase's probe.
    pub fn on_page(&mut self, result: &PageResult, env: &mut SessionEnv<'_>) -> Step {
        let config = env.config;
        let page_size = config.page_size;
        let count = result.count().min(config.page_len()) as u32;
        let Some(probed) = self.probe_page(config.glitch_page) else {
            debug!(phase = %self.phase, "completion after the search finished");
            return Step::Idle;
        };

        match self.phase {
            Phase::CheckTotal => {
                if count == 0 {
                    return self.abort(AbortReason::empty("No levels found."));
                }
                let trusted = result
                    .declared_total
                    .filter(|total| *total > 0 && *total < config.trusted_total_limit);
                if let Some((max_page, last_count)) =
                    trusted.and_then(|total| boundary_from_total(total, page_size))
                {
                    info!(total = ?trusted, max_page, last_count, "declared total trusted");
                    return self.resolve(max_page, last_count, env);
                }
                self.advance(Phase::GlitchCheck, config.timing.soft())
            }

            Phase::CachePeek { cached } => {
                if count == 0 {
                    info!(cached, "cached page empty; searching backwards");
                    self.advance(
                        Phase::BinarySearch {
                            low: 0,
                            high: cached,
                        },
                        config.timing.search(),
                    )
                } else if count < page_size {
                    info!(cached, count, "cached page is partial; boundary confirmed");
                    self.resolve(cached, count, env)
                } else {
                    self.advance(Phase::CacheNext { cached }, config.timing.soft())
                }
            }

            Phase::CacheNext { cached } => {
                if count == 0 {
                    info!(cached, "next page empty; cached page was the last");
                    self.resolve(cached, page_size, env)
                } else if count < page_size {
                    info!(page = probed, count, "collection grew by a partial page");
                    self.resolve(probed, count, env)
                } else if probed >= config.glitch_page {
                    info!(page = probed, "full page at or past the glitch page; capping");
                    self.resolve_capped(env)
                } else {
                    info!(page = probed, "next page full; expanding search to the glitch page");
                    self.advance(
                        Phase::BinarySearch {
                            low: probed,
                            high: config.glitch_page,
                        },
                        config.timing.search(),
                    )
                }
            }

            Phase::GlitchCheck => {
                if count > 0 {
                    info!(page = probed, "glitch page has items; capping");
                    self.resolve_capped(env)
                } else {
                    info!("finite collection; binary search");
                    self.advance(
                        Phase::BinarySearch {
                            low: 0,
                            high: config.glitch_page,
                        },
                        config.timing.search(),
                    )
                }
            }

            Phase::BinarySearch { low, high } => {
                if count > 0 && probed >= config.glitch_page {
                    info!(page = probed, "binary search reached the glitch page; capping");
                    return self.resolve_capped(env);
                }
                let (low, high) = if count > 0 {
                    (probed, high)
                } else {
                    (low, probed)
                };
                self.narrow(low, high, env)
            }

            Phase::CalcExact { page, backtracks } => {
                if count > 0 {
                    return self.resolve(page, count, env);
                }
                if page == 0 {
                    return self.abort(AbortReason::empty("Final page empty."));
                }
                if backtracks >= config.max_backtracks {
                    warn!(page, backtracks, "boundary page keeps coming back empty");
                    return self.abort(AbortReason::empty("Final page empty."));
                }
                info!(page, "boundary page empty; stepping back");
                self.advance(
                    Phase::CalcExact {
                        page: page - 1,
                        backtracks: backtracks + 1,
                    },
                    config.timing.soft(),
                )
            }

            Phase::FetchTarget { page, slot, total } => {
                if count == 0 {
                    let stale = AbortReason::StaleCache {
                        fingerprint: self.fingerprint.to_string(),
                    };
                    info!(
                        kind = stale.kind(),
                        page,
                        fingerprint = self.fingerprint.digest(),
                        "target page empty; restarting discovery"
                    );
                    if self.using_filters {
                        env.state.invalidate(&self.fingerprint);
                    }
                    return self.advance(Phase::CheckTotal, config.timing.soft());
                }
                let clamped = slot.min(count - 1) as usize;
                match result.items.get(clamped) {
                    Some(item) => {
                        self.phase = Phase::Done;
                        Step::Resolved(Resolution {
                            item: item.clone(),
                            detail: ResolutionDetail::Page {
                                page,
                                slot: clamped as u32,
                                total,
                            },
                        })
                    }
                    None => self.abort(AbortReason::InvalidSelection {
                        slot: i64::from(slot),
                        count: result.count(),
                    }),
                }
            }

            Phase::Done | Phase::Aborted => Step::Idle,
        }
    }

    /// Handle a transport failure for the current phase's probe.
    pub fn on_failure(&mut self, detail: &str, env: &mut SessionEnv<'_>) -> Step {
        let config = env.config;
        warn!(phase = %self.phase, detail, "page fetch failed");
        match self.phase {
            Phase::CachePeek { cached } => self.advance(
                Phase::BinarySearch {
                    low: 0,
                    high: cached,
                },
                config.timing.search(),
            ),
            Phase::CacheNext { cached } => {
                info!(cached, "next page unavailable; using cached page as full");
                self.resolve(cached, config.page_size, env)
            }
            Phase::GlitchCheck => self.advance(
                Phase::BinarySearch {
                    low: 0,
                    high: config.glitch_page,
                },
                config.timing.search(),
            ),
            Phase::BinarySearch { low, high } => {
                let probed = bracket_mid(low, high);
                self.narrow(low, probed, env)
            }
            Phase::CheckTotal | Phase::CalcExact { .. } | Phase::FetchTarget { .. } => {
                self.retry_count += 1;
                if self.retry_count > config.max_retries {
                    return self.abort(AbortReason::ExhaustedRetries {
                        attempts: self.retry_count,
                    });
                }
                info!(retry = self.retry_count, phase = %self.phase, "retrying");
                Step::Continue {
                    delay: config.timing.retry(),
                }
            }
            Phase::Done | Phase::Aborted => {
                debug!(phase = %self.phase, "failure after the search finished");
                Step::Idle
            }
        }
    }

    fn narrow(&mut self, low: u32, high: u32, env: &SessionEnv<'_>) -> Step {
        let next = if high.saturating_sub(low) <= 1 {
            info!(max_page = low, "bracket converged");
            Phase::CalcExact {
                page: low,
                backtracks: 0,
            }
        } else {
            Phase::BinarySearch { low, high }
        };
        self.advance(next, env.config.timing.search())
    }

    fn advance(&mut self, next: Phase, delay: std::time::Duration) -> Step {
        self.phase = next;
        Step::Continue { delay }
    }

    fn abort(&mut self, reason: AbortReason) -> Step {
        self.phase = Phase::Aborted;
        Step::Abort(reason)
    }

    fn resolve_capped(&mut self, env: &mut SessionEnv<'_>) -> Step {
        let (page, count) = (env.config.capped_page, env.config.capped_count);
        self.resolve(page, count, env)
    }

    /// Record the boundary, draw a uniform global index and move to
    /// `FetchTarget`.
    fn resolve(&mut self, max_page: u32, count_on_max_page: u32, env: &mut SessionEnv<'_>) -> Step {
        let page_size = env.config.page_size;
        if self.using_filters {
            env.state.record_boundary(&self.fingerprint, max_page);
        }
        let total =
            u64::from(max_page) * u64::from(page_size) + u64::from(count_on_max_page.min(page_size));
        if total == 0 {
            return self.abort(AbortReason::empty("No levels found."));
        }
        let global_index = env.rng.uniform_inclusive(0, total - 1);
        let (page, slot) = locate(global_index, page_size);
        info!(max_page, count_on_max_page, total, global_index, page, slot, "target chosen");
        self.advance(
            Phase::FetchTarget { page, slot, total },
            env.config.timing.resolve(),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pagedraw_cache::MemoryStore;
    use pagedraw_types::Item;
    use proptest::prelude::*;

    use super::*;
    use crate::config::ControllerConfig;
    use crate::random::RandomSource;
    use crate::state::ProcessState;

    struct Fixture {
        config: ControllerConfig,
        state: ProcessState,
        rng: RandomSource,
        store: MemoryStore,
    }

    impl Fixture {
        fn new() -> Self {
            let store = MemoryStore::new();
            let state = ProcessState::load(Box::new(store.clone()), "filter_cache").expect("load");
            Self {
                config: ControllerConfig::default(),
                state,
                rng: RandomSource::from_seed(11),
                store,
            }
        }

        fn env(&mut self) -> SessionEnv<'_> {
            SessionEnv {
                config: &self.config,
                state: &mut self.state,
                rng: &mut self.rng,
            }
        }

        fn engine(&mut self, cached: Option<u32>) -> DiscoveryEngine {
            let env = self.env();
            DiscoveryEngine::start(filters(), cached, &env)
        }
    }

    fn filters() -> FilterSet {
        FilterSet {
            star: true,
            difficulty: Some("5".to_owned()),
            ..FilterSet::default()
        }
    }

    fn page_of(count: usize) -> PageResult {
        PageResult::new((0..count).map(|i| Item::new(1_000 + i as u64, format!("item-{i}"))).collect())
    }

    fn continue_delay(step: &Step) -> Duration {
        match step {
            Step::Continue { delay } => *delay,
            other => panic!("expected Continue, got {other:?}"),
        }
    }

    #[test]
    fn entry_phase_follows_cache() {
        let mut fx = Fixture::new();
        assert_eq!(fx.engine(None).phase(), Phase::CheckTotal);
        assert_eq!(fx.engine(Some(12)).phase(), Phase::CachePeek { cached: 12 });
        assert_eq!(fx.engine(Some(501)).phase(), Phase::GlitchCheck);
        assert_eq!(fx.engine(Some(1000)).phase(), Phase::GlitchCheck);
        assert_eq!(fx.engine(Some(2500)).phase(), Phase::GlitchCheck);
        assert_eq!(fx.engine(Some(0)).phase(), Phase::CachePeek { cached: 0 });
    }

    #[test]
    fn declared_total_short_circuits() {
        let mut fx = Fixture::new();
        let mut engine = fx.engine(None);
        let step = engine.on_page(&page_of(10).with_declared_total(37), &mut fx.env());
        assert_eq!(continue_delay(&step), Duration::from_millis(100));
        let Phase::FetchTarget { page, slot, total } = engine.phase() else {
            panic!("expected FetchTarget, got {}", engine.phase());
        };
        assert_eq!(total, 37);
        assert!(u64::from(page) * 10 + u64::from(slot) < 37);
        assert_eq!(fx.state.cached_boundary(engine.fingerprint()), Some(3));
    }

    #[test]
    fn untrusted_total_goes_to_glitch_check() {
        let mut fx = Fixture::new();
        let mut engine = fx.engine(None);
        let step = engine.on_page(&page_of(10).with_declared_total(9990), &mut fx.env());
        assert_eq!(continue_delay(&step), Duration::from_millis(500));
        assert_eq!(engine.phase(), Phase::GlitchCheck);

        let mut engine = fx.engine(None);
        engine.on_page(&page_of(10), &mut fx.env());
        assert_eq!(engine.phase(), Phase::GlitchCheck);
    }

    #[test]
    fn empty_first_page_aborts_without_cache_write() {
        let mut fx = Fixture::new();
        let mut engine = fx.engine(None);
        let step = engine.on_page(&PageResult::empty(), &mut fx.env());
        assert!(matches!(step, Step::Abort(AbortReason::EmptyCollection { .. })));
        assert_eq!(engine.phase(), Phase::Aborted);
        assert_eq!(fx.store.save_count(), 0);
    }

    #[test]
    fn cache_peek_full_then_partial_next() {
        let mut fx = Fixture::new();
        let mut engine = fx.engine(Some(12));
        engine.on_page(&page_of(10), &mut fx.env());
        assert_eq!(engine.phase(), Phase::CacheNext { cached: 12 });
        assert_eq!(engine.probe_page(1000), Some(13));

        engine.on_page(&page_of(4), &mut fx.env());
        assert!(matches!(engine.phase(), Phase::FetchTarget { .. }));
        assert_eq!(fx.state.cached_boundary(engine.fingerprint()), Some(13));
    }

    #[test]
    fn cache_peek_empty_searches_backwards() {
        let mut fx = Fixture::new();
        let mut engine = fx.engine(Some(40));
        let step = engine.on_page(&PageResult::empty(), &mut fx.env());
        assert_eq!(continue_delay(&step), Duration::from_millis(750));
        assert_eq!(engine.phase(), Phase::BinarySearch { low: 0, high: 40 });
    }

    #[test]
    fn cache_next_full_expands_to_glitch_page() {
        let mut fx = Fixture::new();
        let mut engine = fx.engine(Some(12));
        engine.on_page(&page_of(10), &mut fx.env());
        engine.on_page(&page_of(10), &mut fx.env());
        assert_eq!(
            engine.phase(),
            Phase::BinarySearch {
                low: 13,
                high: 1000
            }
        );
    }

    #[test]
    fn cache_next_at_glitch_page_caps() {
        let mut fx = Fixture::new();
        let mut engine = fx.engine(Some(999));
        engine.on_page(&page_of(10), &mut fx.env());
        assert_eq!(engine.probe_page(1000), Some(1000));
        engine.on_page(&page_of(10), &mut fx.env());
        assert!(matches!(engine.phase(), Phase::FetchTarget { page, .. } if page <= 501));
        assert_eq!(fx.state.cached_boundary(engine.fingerprint()), Some(501));
    }

    #[test]
    fn cache_next_empty_keeps_cached_page() {
        let mut fx = Fixture::new();
        let mut engine = fx.engine(Some(6));
        engine.on_page(&page_of(10), &mut fx.env());
        engine.on_page(&PageResult::empty(), &mut fx.env());
        assert_eq!(fx.state.cached_boundary(engine.fingerprint()), Some(6));
    }

    #[test]
    fn glitch_page_with_items_caps() {
        let mut fx = Fixture::new();
        let mut engine = fx.engine(Some(501));
        engine.on_page(&page_of(3), &mut fx.env());
        assert!(matches!(engine.phase(), Phase::FetchTarget { .. }));
        assert_eq!(fx.state.cached_boundary(engine.fingerprint()), Some(501));
    }

    #[test]
    fn binary_search_glitch_hit_caps() {
        let mut fx = Fixture::new();
        let mut engine = fx.engine(None);
        engine.phase = Phase::BinarySearch {
            low: 1000,
            high: 1004,
        };
        assert_eq!(engine.probe_page(1000), Some(1002));
        engine.on_page(&page_of(10), &mut fx.env());
        assert!(matches!(engine.phase(), Phase::FetchTarget { page, .. } if page <= 501));
        assert_eq!(fx.state.cached_boundary(engine.fingerprint()), Some(501));
    }

    #[test]
    fn bracket_below_glitch_page_never_probes_it() {
        let mut fx = Fixture::new();
        let mut engine = fx.engine(None);
        engine.phase = Phase::BinarySearch {
            low: 13,
            high: 1000,
        };
        while let Phase::BinarySearch { .. } = engine.phase() {
            assert!(engine.probe_page(1000).expect("probe") < 1000);
            engine.on_page(&page_of(10), &mut fx.env());
        }
        assert_eq!(
            engine.phase(),
            Phase::CalcExact {
                page: 999,
                backtracks: 0
            }
        );
    }

    #[test]
    fn calc_exact_steps_back_then_resolves() {
        let mut fx = Fixture::new();
        let mut engine = fx.engine(None);
        engine.phase = Phase::CalcExact {
            page: 5,
            backtracks: 0,
        };
        let step = engine.on_page(&PageResult::empty(), &mut fx.env());
        assert_eq!(continue_delay(&step), Duration::from_millis(500));
        assert_eq!(
            engine.phase(),
            Phase::CalcExact {
                page: 4,
                backtracks: 1
            }
        );
        engine.on_page(&page_of(7), &mut fx.env());
        assert_eq!(fx.state.cached_boundary(engine.fingerprint()), Some(4));
    }

    #[test]
    fn calc_exact_empty_page_zero_aborts() {
        let mut fx = Fixture::new();
        let mut engine = fx.engine(None);
        engine.phase = Phase::CalcExact {
            page: 0,
            backtracks: 0,
        };
        let step = engine.on_page(&PageResult::empty(), &mut fx.env());
        assert_eq!(step, Step::Abort(AbortReason::empty("Final page empty.")));
    }

    #[test]
    fn calc_exact_backtrack_cap() {
        let mut fx = Fixture::new();
        fx.config.max_backtracks = 2;
        let mut engine = fx.engine(None);
        engine.phase = Phase::CalcExact {
            page: 50,
            backtracks: 0,
        };
        engine.on_page(&PageResult::empty(), &mut fx.env());
        engine.on_page(&PageResult::empty(), &mut fx.env());
        let step = engine.on_page(&PageResult::empty(), &mut fx.env());
        assert!(matches!(step, Step::Abort(AbortReason::EmptyCollection { .. })));
    }

    #[test]
    fn fetch_target_empty_invalidates_and_restarts() {
        let mut fx = Fixture::new();
        let mut engine = fx.engine(Some(12));
        engine.on_page(&page_of(3), &mut fx.env());
        assert_eq!(fx.state.cached_boundary(engine.fingerprint()), Some(12));

        let step = engine.on_page(&PageResult::empty(), &mut fx.env());
        assert_eq!(continue_delay(&step), Duration::from_millis(500));
        assert_eq!(engine.phase(), Phase::CheckTotal);
        assert_eq!(fx.state.cached_boundary(engine.fingerprint()), None);
    }

    #[test]
    fn fetch_target_clamps_slot() {
        let mut fx = Fixture::new();
        let mut engine = fx.engine(None);
        engine.phase = Phase::FetchTarget {
            page: 2,
            slot: 8,
            total: 37,
        };
        let step = engine.on_page(&page_of(3), &mut fx.env());
        let Step::Resolved(resolution) = step else {
            panic!("expected resolution");
        };
        assert_eq!(resolution.item.id, 1_002);
        assert_eq!(
            resolution.detail,
            ResolutionDetail::Page {
                page: 2,
                slot: 2,
                total: 37
            }
        );
        assert_eq!(engine.phase(), Phase::Done);
    }

    #[test]
    fn soft_failures_follow_phase_rules() {
        let mut fx = Fixture::new();

        let mut engine = fx.engine(Some(30));
        engine.on_failure("timeout", &mut fx.env());
        assert_eq!(engine.phase(), Phase::BinarySearch { low: 0, high: 30 });

        let mut engine = fx.engine(Some(501));
        engine.on_failure("timeout", &mut fx.env());
        assert_eq!(
            engine.phase(),
            Phase::BinarySearch {
                low: 0,
                high: 1000
            }
        );
        engine.on_failure("timeout", &mut fx.env());
        assert_eq!(engine.phase(), Phase::BinarySearch { low: 0, high: 500 });

        let mut engine = fx.engine(Some(8));
        engine.on_page(&page_of(10), &mut fx.env());
        engine.on_failure("timeout", &mut fx.env());
        assert!(matches!(engine.phase(), Phase::FetchTarget { .. }));
        assert_eq!(fx.state.cached_boundary(engine.fingerprint()), Some(8));
        assert_eq!(engine.retry_count(), 0);
    }

    #[test]
    fn five_failures_retry_sixth_aborts() {
        let mut fx = Fixture::new();
        let mut engine = fx.engine(None);
        for attempt in 1..=5 {
            let step = engine.on_failure("down", &mut fx.env());
            assert_eq!(continue_delay(&step), Duration::from_secs(1), "attempt {attempt}");
            assert_eq!(engine.phase(), Phase::CheckTotal);
        }
        let step = engine.on_failure("down", &mut fx.env());
        assert_eq!(
            step,
            Step::Abort(AbortReason::ExhaustedRetries { attempts: 6 })
        );
    }

    #[test]
    fn calc_exact_failure_retries_same_page() {
        let mut fx = Fixture::new();
        let mut engine = fx.engine(None);
        let calc = Phase::CalcExact {
            page: 42,
            backtracks: 1,
        };
        engine.phase = calc;
        for attempt in 1..=3 {
            let step = engine.on_failure("reset", &mut fx.env());
            assert_eq!(continue_delay(&step), Duration::from_secs(1));
            assert_eq!(engine.phase(), calc);
            assert_eq!(engine.retry_count(), attempt);
        }
        assert_eq!(engine.probe_page(fx.config.glitch_page), Some(42));
        engine.on_page(&page_of(6), &mut fx.env());
        assert!(matches!(engine.phase(), Phase::FetchTarget { .. }));
        assert_eq!(fx.state.cached_boundary(engine.fingerprint()), Some(42));
    }

    #[test]
    fn fetch_target_failure_retries_same_target() {
        let mut fx = Fixture::new();
        let mut engine = fx.engine(None);
        let target = Phase::FetchTarget {
            page: 3,
            slot: 6,
            total: 37,
        };
        engine.phase = target;
        let step = engine.on_failure("timeout", &mut fx.env());
        assert_eq!(continue_delay(&step), Duration::from_secs(1));
        assert_eq!(engine.phase(), target);
        assert_eq!(engine.retry_count(), 1);

        let step = engine.on_page(&page_of(7), &mut fx.env());
        let Step::Resolved(resolution) = step else {
            panic!("expected resolution, got {step:?}");
        };
        assert_eq!(resolution.item.id, 1_006);
    }

    #[test]
    fn retry_budget_is_shared_across_phases() {
        let mut fx = Fixture::new();
        let mut engine = fx.engine(None);
        for _ in 0..3 {
            engine.on_failure("down", &mut fx.env());
        }
        engine.phase = Phase::CalcExact {
            page: 9,
            backtracks: 0,
        };
        engine.on_failure("down", &mut fx.env());
        engine.phase = Phase::FetchTarget {
            page: 1,
            slot: 0,
            total: 95,
        };
        engine.on_failure("down", &mut fx.env());
        assert_eq!(engine.retry_count(), 5);
        let step = engine.on_failure("down", &mut fx.env());
        assert_eq!(
            step,
            Step::Abort(AbortReason::ExhaustedRetries { attempts: 6 })
        );
        assert_eq!(engine.phase(), Phase::Aborted);
    }

    #[test]
    fn terminal_engine_ignores_further_completions() {
        let mut fx = Fixture::new();
        let mut engine = fx.engine(None);
        engine.phase = Phase::Done;
        assert_eq!(engine.on_page(&page_of(4), &mut fx.env()), Step::Idle);
        assert_eq!(engine.on_failure("late", &mut fx.env()), Step::Idle);
        assert_eq!(engine.phase(), Phase::Done);
        assert_eq!(fx.store.save_count(), 0);
    }

    #[test]
    fn boundary_from_total_examples() {
        assert_eq!(boundary_from_total(37, 10), Some((3, 7)));
        assert_eq!(boundary_from_total(40, 10), Some((3, 10)));
        assert_eq!(boundary_from_total(1, 10), Some((0, 1)));
        assert_eq!(boundary_from_total(0, 10), None);
    }

    /// Drive a bracket against an oracle whose last non-empty page is
    /// `boundary`; return the converged page and probe count.
    fn search_against(boundary: u32, low: u32, high: u32) -> (u32, u32) {
        let mut fx = Fixture::new();
        let mut engine = fx.engine(None);
        engine.phase = Phase::BinarySearch { low, high };
        let mut probes = 0;
        while let Phase::BinarySearch { .. } = engine.phase() {
            let page = engine.probe_page(u32::MAX).expect("probe");
            probes += 1;
            let result = if page <= boundary {
                page_of(10)
            } else {
                PageResult::empty()
            };
            engine.on_page(&result, &mut fx.env());
        }
        match engine.phase() {
            Phase::CalcExact { page, .. } => (page, probes),
            other => panic!("unexpected phase {other}"),
        }
    }

    proptest! {
        #[test]
        fn binary_search_converges_on_boundary(
            low in 0u32..400,
            span in 2u32..600,
            offset in 0u32..600,
        ) {
            let high = low + span;
            let boundary = low + offset % span;
            let (found, probes) = search_against(boundary, low, high);
            prop_assert_eq!(found, boundary);
            let bound = u32::BITS - (span - 1).leading_zeros();
            prop_assert!(probes <= bound, "probes={} bound={}", probes, bound);
        }

        #[test]
        fn chosen_target_is_in_range(max_page in 0u32..600, count in 1u32..=10, seed in any::<u64>()) {
            let mut fx = Fixture::new();
            fx.rng = RandomSource::from_seed(seed);
            let mut engine = fx.engine(None);
            engine.phase = Phase::CalcExact { page: max_page, backtracks: 0 };
            engine.on_page(&page_of(count as usize), &mut fx.env());
            let phase = engine.phase();
            prop_assert!(matches!(phase, Phase::FetchTarget { .. }), "phase={}", phase);
            if let Phase::FetchTarget { page, slot, total } = phase {
                prop_assert_eq!(total, u64::from(max_page) * 10 + u64::from(count));
                prop_assert!(slot <= 9);
                prop_assert!(u64::from(page) * 10 + u64::from(slot) < total);
            }
        }
    }
}
