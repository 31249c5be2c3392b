//! Waiting for a file to be created.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::errors::{LifecycleError, LifecycleResult, WaitResource};
use crate::timeout::TimeoutPolicy;

/// Resolves once `path` exists.
///
/// Returns immediately if the file is already present. Otherwise a
/// non-recursive watch is installed on the parent directory and raced against
/// `policy.timeout`; the existence check is also repeated every
/// `policy.poll_interval` so a coalesced notification cannot stall the wait.
/// The parent directory must exist.
pub async fn wait_for_file_to_exist(path: &Path, policy: TimeoutPolicy) -> LifecycleResult<()> {
    if path.exists() {
        return Ok(());
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| LifecycleError::InvalidReadinessPath {
            path: path.to_path_buf(),
        })?
        .to_owned();
    let dir = watch_dir(path);

    let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let _ = tx.send(res);
    })
    .map_err(|source| watch_error(&dir, path, source))?;
    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .map_err(|source| watch_error(&dir, path, source))?;
    debug!(path = %path.display(), dir = %dir.display(), "Watching for readiness file");

    // Created between the first check and the watch.
    if path.exists() {
        return Ok(());
    }

    let wait = async {
        let mut ticker = policy.ticker();
        let mut watching = true;
        loop {
            tokio::select! {
                event = rx.recv(), if watching => match event {
                    Some(Ok(event)) => {
                        if is_creation_of(&event, &file_name) && path.exists() {
                            trace!(path = %path.display(), kind = ?event.kind, "Readiness file event");
                            return;
                        }
                    }
                    Some(Err(e)) => debug!(error = %e, "Watch error, relying on polling"),
                    None => watching = false,
                },
                _ = ticker.tick() => {
                    if path.exists() {
                        return;
                    }
                }
            }
        }
    };

    let result = tokio::time::timeout(policy.timeout, wait).await;
    drop(watcher);
    result.map_err(|_| LifecycleError::Timeout {
        resource: WaitResource::File(path.to_path_buf()),
        timeout: policy.timeout,
    })
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn watch_error(dir: &Path, path: &Path, source: notify::Error) -> LifecycleError {
    LifecycleError::Watch {
        dir: dir.to_path_buf(),
        path: path.to_path_buf(),
        source,
    }
}

fn is_creation_of(event: &Event, file_name: &OsStr) -> bool {
    if matches!(event.kind, EventKind::Remove(_) | EventKind::Access(_)) {
        return false;
    }
    event
        .paths
        .iter()
        .any(|p| p.file_name() == Some(file_name))
}
