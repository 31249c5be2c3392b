//! Shared lifecycle core for the hoover BDD harness.
//!
//! Starts, supervises and tears down the server under test for one test
//! worker, and blocks scenario execution until that server is observably
//! ready:
//! - [`process`] spawns the server and waits for it to exit
//! - [`readiness`] waits for the log file to appear and to contain the marker
//! - [`worker`] derives per-worker ports and readiness file paths
//! - [`lifecycle`] composes the above into the per-scenario state machine
//! - [`config`] reads harness settings from the environment

pub mod config;
pub mod errors;
pub mod lifecycle;
pub mod logging;
pub mod process;
pub mod readiness;
pub mod testing;
pub mod timeout;
pub mod util;
pub mod worker;

pub use config::{HarnessConfig, ServerManagement};
pub use errors::{LifecycleError, LifecycleResult, WaitResource};
pub use lifecycle::{
    CommandLauncher, LifecyclePhase, RecordedResponse, ScenarioState, ServerLauncher,
    ServerLifecycle,
};
pub use process::{LaunchSpec, ManagedProcess, ProcessHandle};
pub use timeout::TimeoutPolicy;
pub use worker::{PortAllocator, ReadinessTarget, WorkerContext, WorkerId, WorkerPorts};
