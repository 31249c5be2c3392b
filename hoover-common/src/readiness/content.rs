//! Waiting for a log file to contain a marker.

use std::path::Path;

use memchr::memmem;
use tracing::{debug, warn};

use crate::errors::{LifecycleError, LifecycleResult, WaitResource};
use crate::process::ProcessHandle;
use crate::timeout::TimeoutPolicy;

/// Resolves once the contents of `path` contain `marker` as a byte substring.
///
/// The whole file is re-read on every poll. When `process` is supplied it is
/// treated as the writer of the log: on timeout its termination is requested
/// (not awaited) before the error is returned, and a read failure terminates
/// it and surfaces [`LifecycleError::Read`]. Without a process, read failures
/// count as "not found yet".
pub async fn wait_for_log_to_contain(
    path: &Path,
    marker: &str,
    policy: TimeoutPolicy,
    mut process: Option<&mut dyn ProcessHandle>,
) -> LifecycleResult<()> {
    let finder = memmem::Finder::new(marker.as_bytes());
    let deadline = tokio::time::sleep(policy.timeout);
    tokio::pin!(deadline);
    let mut ticker = policy.ticker();

    loop {
        tokio::select! {
            biased;
            _ = &mut deadline => {
                if let Some(process) = process.as_deref_mut() {
                    request_termination(process, "readiness marker never logged");
                }
                return Err(LifecycleError::Timeout {
                    resource: WaitResource::LogMarker {
                        path: path.to_path_buf(),
                        marker: marker.to_string(),
                    },
                    timeout: policy.timeout,
                });
            }
            _ = ticker.tick() => {
                match tokio::fs::read(path).await {
                    Ok(contents) => {
                        if finder.find(&contents).is_some() {
                            debug!(path = %path.display(), "Readiness marker found");
                            return Ok(());
                        }
                    }
                    Err(source) => match process.as_deref_mut() {
                        Some(process) => {
                            request_termination(process, "log file unreadable");
                            return Err(LifecycleError::Read {
                                path: path.to_path_buf(),
                                source,
                            });
                        }
                        None => debug!(path = %path.display(), error = %source, "Log not readable yet"),
                    },
                }
            }
        }
    }
}

fn request_termination(process: &mut dyn ProcessHandle, reason: &str) {
    let pid = process.pid();
    match process.request_termination() {
        Ok(()) => warn!(pid, reason, "Terminating server process"),
        Err(e) => warn!(pid, reason, error = %e, "Failed to terminate server process"),
    }
}
