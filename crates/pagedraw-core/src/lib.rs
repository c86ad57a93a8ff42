//! Random selection over a remotely paged collection of unknown size.
//!
//! - [`DiscoveryEngine`] finds the last non-empty page of a filtered
//!   collection (cache peek, declared-total fast path, glitch check, binary
//!   search) and picks a uniform global index.
//! - [`ChaosProbe`] samples the unfiltered catalog by random id.
//! - [`SelectionController`] owns one session at a time and drives either of
//!   them through the collaborator traits in [`collab`].
//! - [`ProcessState`] carries the persisted boundary cache and the max
//!   observed id across sessions and controllers.

pub mod chaos;
pub mod collab;
pub mod config;
pub mod controller;
pub mod discovery;
pub mod random;
pub mod session;
pub mod state;

pub use chaos::{ChaosProbe, ChaosStage};
pub use collab::{
    AuthGate, Collaborators, FetchFailure, FetchOutcome, FetchTicket, FilterSource,
    PageFetchClient, Presenter, Scheduler, TimerToken,
};
pub use config::{ControllerConfig, Timing};
pub use controller::SelectionController;
pub use discovery::{DiscoveryEngine, Phase, boundary_from_total, bracket_mid, locate};
pub use random::RandomSource;
pub use session::{Resolution, ResolutionDetail, SelectionOutcome, SessionEnv, Step};
pub use state::{ProcessState, SharedProcessState};
