//! Uniform random selection from a remotely paged collection of unknown size.
//!
//! ```ignore
//! use pagedraw::{ControllerConfig, JsonFileStore, ProcessState, RandomSource, SelectionController};
//!
//! let config = ControllerConfig::default();
//! let state = ProcessState::for_config(Box::new(JsonFileStore::new(data_dir)), &config)?.shared();
//! let mut controller =
//!     SelectionController::new(config, state, RandomSource::from_entropy(), collaborators)?;
//! controller.start_smart();
//! // host event loop: controller.on_timer(..) / controller.on_fetch_complete(..)
//! ```

pub use pagedraw_cache::{
    BoundaryCache, CacheStore, JsonFileStore, MemoryStore, is_default_unbounded_marker,
    is_unbounded_marker,
};
pub use pagedraw_core::{
    AuthGate, ChaosProbe, Collaborators, ControllerConfig, DiscoveryEngine, FetchFailure,
    FetchOutcome, FetchTicket, FilterSource, PageFetchClient, Phase, Presenter, ProcessState,
    RandomSource, ResolutionDetail, Scheduler, SelectionController, SelectionOutcome,
    SharedProcessState, TimerToken, Timing,
};
pub use pagedraw_error::{AbortReason, DrawError, Result};
pub use pagedraw_types::{
    FetchRequest, FilterFingerprint, FilterSet, Item, PageResult, SearchMode,
};
