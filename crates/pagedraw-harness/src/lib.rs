//! Test harness for pagedraw.
//!
//! [`sim`] provides in-memory collaborators with a virtual clock so a real
//! [`SelectionController`](pagedraw::SelectionController) can be driven to
//! completion deterministically. [`logging`] installs a tracing subscriber
//! for test output.

pub mod logging;
pub mod sim;

pub use sim::{
    ManualScheduler, RecordingPresenter, RunReport, Scripted, SharedAuth, SharedFilters,
    SimCollection, SimHost, SimRemote,
};
