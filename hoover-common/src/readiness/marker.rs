//! Removal of a stale readiness file before a launch.

use std::io;
use std::path::Path;

use tracing::debug;

use crate::errors::{LifecycleError, LifecycleResult};

/// Deletes `path` if present. Returns whether a file was removed.
///
/// A missing file is not an error.
pub fn delete_file_if_existed(path: &Path) -> LifecycleResult<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed stale readiness file");
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(LifecycleError::RemoveMarker {
            path: path.to_path_buf(),
            source,
        }),
    }
}
