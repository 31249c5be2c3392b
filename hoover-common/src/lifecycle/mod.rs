//! Per-scenario server lifecycle.
//!
//! [`ServerLifecycle`] drives one worker's server through
//! `Idle -> Stopping -> ClearingMarker -> Starting -> AwaitingFileReady ->
//! AwaitingContentReady -> Ready` and hands back a fresh [`ScenarioState`].

pub mod orchestrator;
pub mod state;

pub use orchestrator::{CommandLauncher, LifecyclePhase, ServerLauncher, ServerLifecycle};
pub use state::{RecordedResponse, ScenarioState};
