//! Worker identity and the resources derived from it.
//!
//! Parallel workers never share a port or a readiness file. Both are derived
//! from the worker id by construction, so no locking is needed between
//! workers.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::Span;

use crate::errors::{LifecycleError, LifecycleResult};

/// Base port for the server under test; worker `n` listens on `8080 + n`.
pub const DEFAULT_BASE_PORT: u16 = 8080;

/// Base debug port; worker `n` exposes its debugger on `4000 + n`.
pub const DEFAULT_BASE_DEBUG_PORT: u16 = 4000;

/// Default directory the server under test writes its log file to.
pub const DEFAULT_LOG_DIR: &str = "/usr/local/demo-app/logs";

/// Identity of a parallel test worker. `0` is the main worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct WorkerId(u32);

impl WorkerId {
    /// The main (non-parallel) worker.
    pub const MAIN: Self = Self(0);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Validates a raw identity, rejecting negative values.
    pub fn from_raw(raw: i64) -> LifecycleResult<Self> {
        u32::try_from(raw)
            .map(Self)
            .map_err(|_| LifecycleError::InvalidWorker(raw))
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for WorkerId {
    type Error = LifecycleError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Self::from_raw(raw)
    }
}

/// Ports assigned to one worker's server instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPorts {
    pub server: u16,
    pub debug: u16,
}

/// Derives worker-exclusive ports from fixed bases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortAllocator {
    base_port: u16,
    base_debug_port: u16,
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_PORT, DEFAULT_BASE_DEBUG_PORT)
    }
}

impl PortAllocator {
    pub const fn new(base_port: u16, base_debug_port: u16) -> Self {
        Self {
            base_port,
            base_debug_port,
        }
    }

    pub const fn base_port(&self) -> u16 {
        self.base_port
    }

    pub const fn base_debug_port(&self) -> u16 {
        self.base_debug_port
    }

    /// `base_port + worker`.
    pub fn server_port(&self, worker: WorkerId) -> LifecycleResult<u16> {
        offset(self.base_port, worker)
    }

    /// `base_debug_port + worker`.
    pub fn debug_port(&self, worker: WorkerId) -> LifecycleResult<u16> {
        offset(self.base_debug_port, worker)
    }

    pub fn ports(&self, worker: WorkerId) -> LifecycleResult<WorkerPorts> {
        Ok(WorkerPorts {
            server: self.server_port(worker)?,
            debug: self.debug_port(worker)?,
        })
    }
}

fn offset(base: u16, worker: WorkerId) -> LifecycleResult<u16> {
    u16::try_from(worker.get())
        .ok()
        .and_then(|id| base.checked_add(id))
        .ok_or(LifecycleError::PortOverflow {
            worker: worker.get(),
            base,
        })
}

/// Absolute path of the log file that doubles as the readiness channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessTarget {
    path: PathBuf,
}

impl ReadinessTarget {
    /// Uses `override_path` when set, otherwise the worker's file in `log_dir`.
    pub fn resolve(override_path: Option<&Path>, log_dir: &Path, worker: WorkerId) -> Self {
        match override_path {
            Some(path) => Self::new(path),
            None => Self::for_worker(log_dir, worker),
        }
    }

    /// `<log_dir>/application-<worker>.log`.
    pub fn for_worker(log_dir: &Path, worker: WorkerId) -> Self {
        Self::new(&log_dir.join(format!("application-{worker}.log")))
    }

    fn new(path: &Path) -> Self {
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for ReadinessTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Per-worker context threaded through lifecycle calls.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    worker: WorkerId,
    span: Span,
}

impl WorkerContext {
    pub fn new(worker: WorkerId) -> Self {
        Self {
            worker,
            span: tracing::info_span!("worker", id = worker.get()),
        }
    }

    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Span that tags every event emitted on behalf of this worker.
    pub fn span(&self) -> &Span {
        &self.span
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_main_worker_uses_base_ports() {
        let ports = PortAllocator::default().ports(WorkerId::MAIN).unwrap();
        assert_eq!(ports, WorkerPorts { server: 8080, debug: 4000 });
    }

    #[test]
    fn test_ports_offset_by_worker() {
        let allocator = PortAllocator::default();
        assert_eq!(allocator.server_port(WorkerId::new(3)).unwrap(), 8083);
        assert_eq!(allocator.debug_port(WorkerId::new(3)).unwrap(), 4003);
    }

    #[test]
    fn test_negative_worker_rejected() {
        let err = WorkerId::from_raw(-1).unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidWorker(-1)));
        assert_eq!(WorkerId::try_from(5_i64).unwrap(), WorkerId::new(5));
    }

    #[test]
    fn test_port_overflow_rejected() {
        let allocator = PortAllocator::new(65_530, 4000);
        assert_eq!(allocator.server_port(WorkerId::new(5)).unwrap(), 65_535);
        assert!(matches!(
            allocator.server_port(WorkerId::new(6)),
            Err(LifecycleError::PortOverflow { worker: 6, base: 65_530 })
        ));
        assert!(allocator.server_port(WorkerId::new(u32::MAX)).is_err());
    }

    #[test]
    fn test_readiness_target_embeds_worker() {
        let target = ReadinessTarget::for_worker(Path::new("/var/log/demo"), WorkerId::new(2));
        assert_eq!(target.path(), Path::new("/var/log/demo/application-2.log"));
    }

    #[test]
    fn test_readiness_target_override_wins() {
        let target = ReadinessTarget::resolve(
            Some(Path::new("/tmp/trigger.log")),
            Path::new("/var/log/demo"),
            WorkerId::new(2),
        );
        assert_eq!(target.path(), Path::new("/tmp/trigger.log"));
    }

    #[test]
    fn test_readiness_target_is_absolute() {
        let target = ReadinessTarget::for_worker(Path::new("logs"), WorkerId::MAIN);
        assert!(target.path().is_absolute());
        assert!(target.path().ends_with("logs/application-0.log"));
    }

    proptest! {
        #[test]
        fn prop_distinct_workers_get_distinct_ports(a in 0u32..20_000, b in 0u32..20_000) {
            prop_assume!(a != b);
            let allocator = PortAllocator::default();
            let (wa, wb) = (WorkerId::new(a), WorkerId::new(b));
            prop_assert_ne!(allocator.server_port(wa).unwrap(), allocator.server_port(wb).unwrap());
            prop_assert_ne!(allocator.debug_port(wa).unwrap(), allocator.debug_port(wb).unwrap());
        }

        #[test]
        fn prop_distinct_workers_get_distinct_readiness_files(a in 0u32..1_000_000, b in 0u32..1_000_000) {
            prop_assume!(a != b);
            let dir = Path::new("/logs");
            prop_assert_ne!(
                ReadinessTarget::for_worker(dir, WorkerId::new(a)),
                ReadinessTarget::for_worker(dir, WorkerId::new(b))
            );
        }
    }
}
