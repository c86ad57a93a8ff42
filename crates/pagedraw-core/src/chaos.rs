//! Filterless selection by random id probing.
//!
//! The upper id bound comes from the newest item in the catalog, fetched once
//! per process and kept in [`ProcessState`](crate::ProcessState). After that,
//! each probe draws an id uniformly from `[min_probe_id, max_id]` and asks the
//! remote for it directly; holes in the id space just mean another probe.
//! Nothing here is capped: empty results and transport failures both retry
//! after the soft delay until the session is cancelled.

use pagedraw_types::{FetchRequest, PageResult};
use tracing::{debug, info, warn};

use crate::session::{Resolution, ResolutionDetail, SessionEnv, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChaosStage {
    /// Waiting for the recent-items query to seed the max id.
    FetchingLatest,
    /// Probing random ids. `last_id` is the id currently in flight.
    Probing { last_id: Option<u64> },
}

#[derive(Debug, Clone)]
pub struct ChaosProbe {
    stage: ChaosStage,
    probes: u64,
}

impl ChaosProbe {
    #[must_use]
    pub fn start(env: &SessionEnv<'_>) -> Self {
        let stage = match env.state.max_observed_id() {
            Some(_) => ChaosStage::Probing { last_id: None },
            None => ChaosStage::FetchingLatest,
        };
        info!(stage = ?stage, "chaos probe started");
        Self { stage, probes: 0 }
    }

    #[must_use]
    pub fn stage(&self) -> ChaosStage {
        self.stage
    }

    /// Ids probed so far in this session.
    #[must_use]
    pub fn probes(&self) -> u64 {
        self.probes
    }

    /// Probe bound: the observed max id, never below the minimum probe id.
    #[must_use]
    pub fn max_id(env: &SessionEnv<'_>) -> u64 {
        env.state
            .max_observed_id()
            .unwrap_or(env.config.fallback_max_id)
            .max(env.config.min_probe_id)
    }

    pub fn next_request(&mut self, env: &mut SessionEnv<'_>) -> FetchRequest {
        match self.stage {
            ChaosStage::FetchingLatest => FetchRequest::Recent,
            ChaosStage::Probing { .. } => {
                let max_id = Self::max_id(env);
                let id = env.rng.uniform_inclusive(env.config.min_probe_id, max_id);
                self.stage = ChaosStage::Probing { last_id: Some(id) };
                self.probes += 1;
                debug!(id, max_id, probe = self.probes, "probing id");
                FetchRequest::ById { id }
            }
        }
    }

    pub fn on_page(&mut self, result: &PageResult, env: &mut SessionEnv<'_>) -> Step {
        let soft = env.config.timing.soft();
        match self.stage {
            ChaosStage::FetchingLatest => {
                let newest = result.items.first().map_or(0, |item| item.id);
                let max_id = if newest > 0 {
                    newest
                } else {
                    env.config.fallback_max_id
                };
                env.state.set_max_observed_id(max_id);
                info!(max_id, "max observed id seeded");
                self.stage = ChaosStage::Probing { last_id: None };
                Step::Continue { delay: soft }
            }
            ChaosStage::Probing { last_id } => {
                if result.is_empty() {
                    return Step::Continue { delay: soft };
                }
                let slot = env.rng.index(result.count());
                let item = result.items[slot].clone();
                let max_id = Self::max_id(env);
                Step::Resolved(Resolution {
                    detail: ResolutionDetail::Probe {
                        id: last_id.unwrap_or(item.id),
                        max_id,
                    },
                    item,
                })
            }
        }
    }

    pub fn on_failure(&mut self, detail: &str, env: &SessionEnv<'_>) -> Step {
        warn!(stage = ?self.stage, detail, "chaos fetch failed; retrying");
        Step::Continue {
            delay: env.config.timing.soft(),
        }
    }
}
