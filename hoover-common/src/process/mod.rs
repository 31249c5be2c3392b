//! Supervision of the server-under-test process.
//!
//! - [`supervisor`] spawns the child and forwards its output to tracing.
//! - [`termination`] requests termination and waits for the exit to be seen.

pub mod supervisor;
pub mod termination;

use std::io;
use std::process::ExitStatus;

pub use supervisor::{LaunchSpec, ManagedProcess, OutputStream, spawn_supervised};
pub use termination::wait_for_process_to_be_killed;

/// A process the harness can terminate and observe.
///
/// Implemented by [`ManagedProcess`]; the waiters only depend on this trait.
pub trait ProcessHandle: Send {
    /// Operating-system process identifier.
    fn pid(&self) -> u32;

    /// Asks the process to terminate without waiting for it to do so.
    fn request_termination(&mut self) -> io::Result<()>;

    /// Non-blocking check of the exit status; `None` while still running.
    fn try_exit_status(&mut self) -> io::Result<Option<ExitStatus>>;
}
