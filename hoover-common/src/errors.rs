//! Error types for server lifecycle operations.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The resource a bounded wait was blocked on.
///
/// Rendered into every timeout message so a CI failure names the file or
/// process involved without a local re-run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitResource {
    /// A file expected to be created.
    File(PathBuf),
    /// A log file expected to contain a marker string.
    LogMarker { path: PathBuf, marker: String },
    /// A process expected to exit.
    ProcessExit { pid: u32 },
}

impl fmt::Display for WaitResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "file {} to exist", path.display()),
            Self::LogMarker { path, marker } => {
                write!(f, "log file {} to contain {marker:?}", path.display())
            }
            Self::ProcessExit { pid } => write!(f, "process with pid {pid} to exit"),
        }
    }
}

/// Errors raised while managing the server under test.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to spawn server process {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("timed out after {} waiting for {resource}", humantime::format_duration(*timeout))]
    Timeout {
        resource: WaitResource,
        timeout: Duration,
    },

    #[error("failed to read log file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to watch {} for {}: {source}", dir.display(), path.display())]
    Watch {
        dir: PathBuf,
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("readiness path {} has no file name", path.display())]
    InvalidReadinessPath { path: PathBuf },

    #[error("failed to remove readiness file {}: {source}", path.display())]
    RemoveMarker {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to prepare log directory {}: {source}", dir.display())]
    PrepareLogDir {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid worker identity {0}: must be non-negative")]
    InvalidWorker(i64),

    #[error("worker {worker} cannot derive a port from base {base}: exceeds 65535")]
    PortOverflow { worker: u32, base: u16 },

    #[error("failed to stop previous server process (pid {pid}): {source}")]
    StaleStop {
        pid: u32,
        #[source]
        source: Box<LifecycleError>,
    },
}

impl LifecycleError {
    /// Whether this error is a bounded wait that ran out of time.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::StaleStop { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

/// Result type for lifecycle operations
pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_file_and_duration() {
        let err = LifecycleError::Timeout {
            resource: WaitResource::File(PathBuf::from("/tmp/never.log")),
            timeout: Duration::from_millis(200),
        };
        let msg = err.to_string();
        assert!(msg.contains("/tmp/never.log"), "{msg}");
        assert!(msg.contains("200ms"), "{msg}");
    }

    #[test]
    fn test_timeout_message_names_pid() {
        let err = LifecycleError::Timeout {
            resource: WaitResource::ProcessExit { pid: 4242 },
            timeout: Duration::from_secs(10),
        };
        let msg = err.to_string();
        assert!(msg.contains("4242"), "{msg}");
        assert!(msg.contains("10s"), "{msg}");
    }

    #[test]
    fn test_marker_message_quotes_marker() {
        let resource = WaitResource::LogMarker {
            path: PathBuf::from("/logs/application-3.log"),
            marker: "Started AppRunner in ".to_string(),
        };
        assert_eq!(
            resource.to_string(),
            "log file /logs/application-3.log to contain \"Started AppRunner in \""
        );
    }

    #[test]
    fn test_is_timeout_sees_through_stale_stop() {
        let err = LifecycleError::StaleStop {
            pid: 7,
            source: Box::new(LifecycleError::Timeout {
                resource: WaitResource::ProcessExit { pid: 7 },
                timeout: Duration::from_secs(1),
            }),
        };
        assert!(err.is_timeout());
        assert!(!LifecycleError::InvalidWorker(-1).is_timeout());
    }
}
