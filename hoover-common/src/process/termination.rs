//! Termination of a supervised process with a bounded wait for its exit.

use std::process::ExitStatus;

use tracing::{debug, warn};

use super::ProcessHandle;
use crate::errors::{LifecycleError, LifecycleResult, WaitResource};
use crate::timeout::TimeoutPolicy;

/// Requests termination of `process` and waits until its exit is observed.
///
/// Delivery of the request is logged but not required: a process that has
/// already exited (or died between checks) resolves on the first poll. Fails
/// with [`LifecycleError::Timeout`] naming the pid when the process is still
/// running after `policy.timeout`.
pub async fn wait_for_process_to_be_killed<P>(
    process: &mut P,
    policy: TimeoutPolicy,
) -> LifecycleResult<ExitStatus>
where
    P: ProcessHandle + ?Sized,
{
    let pid = process.pid();
    match process.request_termination() {
        Ok(()) => debug!(pid, "Termination signal delivered"),
        Err(e) => warn!(pid, error = %e, "Failed to deliver termination signal"),
    }

    let poll = async {
        let mut ticker = policy.ticker();
        loop {
            ticker.tick().await;
            match process.try_exit_status() {
                Ok(Some(status)) => return status,
                Ok(None) => {}
                Err(e) => debug!(pid, error = %e, "Exit status check failed"),
            }
        }
    };

    tokio::time::timeout(policy.timeout, poll)
        .await
        .map_err(|_| LifecycleError::Timeout {
            resource: WaitResource::ProcessExit { pid },
            timeout: policy.timeout,
        })
}
