//! Scenario setup and suite teardown for the server under test.

use std::fmt;

use tracing::{Instrument, debug, info, warn};

use super::state::ScenarioState;
use crate::config::{HarnessConfig, ServerManagement};
use crate::errors::{LifecycleError, LifecycleResult};
use crate::process::{
    LaunchSpec, ManagedProcess, ProcessHandle, spawn_supervised, wait_for_process_to_be_killed,
};
use crate::readiness::{delete_file_if_existed, wait_for_file_to_exist, wait_for_log_to_contain};
use crate::worker::{ReadinessTarget, WorkerContext, WorkerPorts};

/// Where the orchestrator is in bringing up a server.
///
/// A failed setup leaves the phase at the step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecyclePhase {
    #[default]
    Idle,
    Stopping,
    ClearingMarker,
    Starting,
    AwaitingFileReady,
    AwaitingContentReady,
    Ready,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Stopping => "stopping",
            Self::ClearingMarker => "clearing-marker",
            Self::Starting => "starting",
            Self::AwaitingFileReady => "awaiting-file-ready",
            Self::AwaitingContentReady => "awaiting-content-ready",
            Self::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// Starts server processes on behalf of the orchestrator.
pub trait ServerLauncher: Send + Sync {
    fn launch(&self, spec: &LaunchSpec, ctx: &WorkerContext) -> LifecycleResult<ManagedProcess>;
}

/// Launches the server as a supervised child process.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandLauncher;

impl ServerLauncher for CommandLauncher {
    fn launch(&self, spec: &LaunchSpec, ctx: &WorkerContext) -> LifecycleResult<ManagedProcess> {
        spawn_supervised(spec, ctx)
    }
}

/// Drives one worker's server through scenario setup and suite teardown.
pub struct ServerLifecycle<L = CommandLauncher> {
    config: HarnessConfig,
    ctx: WorkerContext,
    target: ReadinessTarget,
    ports: WorkerPorts,
    launcher: L,
    phase: LifecyclePhase,
    teardown_armed: bool,
}

impl ServerLifecycle<CommandLauncher> {
    pub fn new(config: HarnessConfig) -> LifecycleResult<Self> {
        Self::with_launcher(config, CommandLauncher)
    }
}

impl<L: ServerLauncher> ServerLifecycle<L> {
    /// Fails when the worker's ports cannot be derived.
    pub fn with_launcher(config: HarnessConfig, launcher: L) -> LifecycleResult<Self> {
        let ctx = WorkerContext::new(config.worker);
        let ports = config.ports.ports(config.worker)?;
        let target = config.readiness_target();
        Ok(Self {
            config,
            ctx,
            target,
            ports,
            launcher,
            phase: LifecyclePhase::Idle,
            teardown_armed: false,
        })
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    pub fn readiness_target(&self) -> &ReadinessTarget {
        &self.target
    }

    pub fn ports(&self) -> WorkerPorts {
        self.ports
    }

    /// Whether a suite teardown is pending.
    pub fn teardown_armed(&self) -> bool {
        self.teardown_armed
    }

    /// Service base URI for this worker.
    pub fn base_uri(&self) -> String {
        self.config.base_uri(self.ports.server)
    }

    /// Program, arguments and environment for this worker's server.
    pub fn launch_spec(&self) -> LaunchSpec {
        let log_file = self.target.path().display().to_string();
        LaunchSpec::new(&self.config.server_command)
            .args(self.config.server_args.iter().cloned())
            .env("SERVER_PORT", self.ports.server.to_string())
            .env("DEBUG_PORT", self.ports.debug.to_string())
            .env("SERVER_LOG_FILE", log_file.clone())
            .env(
                "SERVER_FLAGS",
                format!("-Dserver.port={} -Dlogging.file={log_file}", self.ports.server),
            )
    }

    /// Replaces `previous` with a fresh state backed by a ready server.
    ///
    /// Any server held by `previous` is stopped first. The returned state has
    /// an empty request, no response and the new server process (none when
    /// the server is external or management is disabled).
    pub async fn ensure_fresh_server(
        &mut self,
        previous: ScenarioState,
    ) -> LifecycleResult<ScenarioState> {
        let span = self.ctx.span().clone();
        self.bring_up(previous).instrument(span).await
    }

    async fn bring_up(&mut self, mut previous: ScenarioState) -> LifecycleResult<ScenarioState> {
        let management = self.config.management;
        if management == ServerManagement::Disabled {
            debug!("Server management disabled, resetting scenario state only");
            self.phase = LifecyclePhase::Ready;
            return Ok(ScenarioState::new());
        }

        self.enter(LifecyclePhase::Stopping);
        if let Some(process) = previous.take_server_process() {
            self.stop(process).await?;
        }
        drop(previous);

        self.enter(LifecyclePhase::ClearingMarker);
        let path = self.target.path();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| LifecycleError::PrepareLogDir {
                dir: dir.to_path_buf(),
                source,
            })?;
        }
        delete_file_if_existed(path)?;

        self.enter(LifecyclePhase::Starting);
        let mut process = if management.owns_process() {
            let spec = self.launch_spec();
            Some(self.launcher.launch(&spec, &self.ctx)?)
        } else {
            debug!("Server is external, not spawning");
            None
        };

        self.enter(LifecyclePhase::AwaitingFileReady);
        wait_for_file_to_exist(self.target.path(), self.config.file_wait).await?;

        self.enter(LifecyclePhase::AwaitingContentReady);
        wait_for_log_to_contain(
            self.target.path(),
            &self.config.ready_marker,
            self.config.log_wait,
            process.as_mut().map(|p| p as &mut dyn ProcessHandle),
        )
        .await?;

        self.enter(LifecyclePhase::Ready);
        self.teardown_armed = true;
        info!(
            port = self.ports.server,
            pid = process.as_ref().map(ManagedProcess::pid),
            readiness_file = %self.target,
            "Server ready"
        );
        Ok(ScenarioState::with_process(process))
    }

    /// Stops the server held by `state`, if any.
    pub async fn ensure_shutdown(&mut self, state: &mut ScenarioState) -> LifecycleResult<()> {
        let span = self.ctx.span().clone();
        async {
            if let Some(process) = state.take_server_process() {
                self.enter(LifecyclePhase::Stopping);
                self.stop(process).await?;
            }
            self.enter(LifecyclePhase::Idle);
            Ok::<(), LifecycleError>(())
        }
        .instrument(span)
        .await
    }

    /// Runs after the last scenario; stops the server once setup has
    /// succeeded at least once.
    pub async fn suite_teardown(&mut self, state: &mut ScenarioState) -> LifecycleResult<()> {
        if !self.teardown_armed {
            debug!(worker = %self.ctx.worker(), "Suite teardown not armed, nothing to stop");
            return Ok(());
        }
        self.teardown_armed = false;
        self.ensure_shutdown(state).await
    }

    async fn stop(&self, mut process: ManagedProcess) -> LifecycleResult<()> {
        let pid = process.pid();
        match wait_for_process_to_be_killed(&mut process, self.config.stop_wait).await {
            Ok(status) => {
                info!(pid, %status, "Previous server stopped");
                Ok(())
            }
            Err(source) if self.config.strict_stop => Err(LifecycleError::StaleStop {
                pid,
                source: Box::new(source),
            }),
            Err(e) => {
                warn!(
                    pid,
                    timeout = %humantime::format_duration(self.config.stop_wait.timeout),
                    error = %e,
                    "Previous server did not stop, continuing"
                );
                Ok(())
            }
        }
    }

    fn enter(&mut self, phase: LifecyclePhase) {
        debug!(from = %self.phase, to = %phase, "Lifecycle phase");
        self.phase = phase;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::timeout::TimeoutPolicy;
    use crate::worker::{PortAllocator, WorkerId};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    const READY_SCRIPT: &str = "echo booting; printf 'Started AppRunner in 0.1 seconds\\n' >> \"$SERVER_LOG_FILE\"; exec sleep 30";

    /// Becomes ready but ignores SIGTERM, so only the drop-time kill ends it.
    const STUBBORN_SCRIPT: &str =
        "trap '' TERM; printf 'Server up\\n' >> \"$SERVER_LOG_FILE\"; exec sleep 60";

    struct CountingLauncher {
        launches: AtomicU32,
    }

    impl ServerLauncher for CountingLauncher {
        fn launch(&self, spec: &LaunchSpec, ctx: &WorkerContext) -> LifecycleResult<ManagedProcess> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            spawn_supervised(spec, ctx)
        }
    }

    fn config(dir: &std::path::Path, worker: u32) -> HarnessConfig {
        HarnessConfig::default()
            .with_worker(WorkerId::new(worker))
            .with_log_dir(dir)
            .with_server_command("/bin/sh", ["-c", READY_SCRIPT])
            .with_wait_policy(TimeoutPolicy::new(
                Duration::from_secs(10),
                Duration::from_millis(20),
            ))
    }

    #[test]
    fn test_launch_spec_environment() {
        let dir = tempfile::tempdir().unwrap();
        let lifecycle = ServerLifecycle::new(
            config(dir.path(), 2).with_ports(PortAllocator::new(9000, 5000)),
        )
        .unwrap();
        let spec = lifecycle.launch_spec();
        let log_file = dir.path().join("application-2.log").display().to_string();

        assert_eq!(spec.program, std::path::PathBuf::from("/bin/sh"));
        assert_eq!(spec.env["SERVER_PORT"], "9002");
        assert_eq!(spec.env["DEBUG_PORT"], "5002");
        assert_eq!(spec.env["SERVER_LOG_FILE"], log_file);
        assert_eq!(
            spec.env["SERVER_FLAGS"],
            format!("-Dserver.port=9002 -Dlogging.file={log_file}")
        );
        assert_eq!(lifecycle.base_uri(), "http://localhost:9002");
    }

    #[test]
    fn test_port_overflow_rejected_at_construction() {
        let dir = tempfile::tempdir().unwrap();
        let result = ServerLifecycle::new(
            config(dir.path(), 10).with_ports(PortAllocator::new(65_530, 4000)),
        );
        assert!(matches!(result, Err(LifecycleError::PortOverflow { .. })));
    }

    #[tokio::test]
    async fn test_restart_replaces_process() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = CountingLauncher {
            launches: AtomicU32::new(0),
        };
        let mut lifecycle = ServerLifecycle::with_launcher(config(dir.path(), 0), launcher).unwrap();

        let first = lifecycle.ensure_fresh_server(ScenarioState::new()).await.unwrap();
        let first_pid = first.server_pid().unwrap();
        assert_eq!(lifecycle.phase(), LifecyclePhase::Ready);
        assert!(lifecycle.teardown_armed());

        let mut second = lifecycle.ensure_fresh_server(first).await.unwrap();
        let second_pid = second.server_pid().unwrap();
        assert_ne!(first_pid, second_pid);
        assert_eq!(lifecycle.launcher.launches.load(Ordering::SeqCst), 2);

        lifecycle.suite_teardown(&mut second).await.unwrap();
        assert!(!second.has_server_process());
        assert!(!lifecycle.teardown_armed());
        assert_eq!(lifecycle.phase(), LifecyclePhase::Idle);
    }

    #[tokio::test]
    async fn test_disabled_management_only_resets_state() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = CountingLauncher {
            launches: AtomicU32::new(0),
        };
        let mut lifecycle = ServerLifecycle::with_launcher(
            config(dir.path(), 0).with_management(ServerManagement::Disabled),
            launcher,
        )
        .unwrap();

        let mut previous = ScenarioState::new();
        previous.request.insert("roomSize".into(), serde_json::json!([5, 5]));
        let state = lifecycle.ensure_fresh_server(previous).await.unwrap();

        assert!(state.request.is_empty());
        assert!(!state.has_server_process());
        assert_eq!(lifecycle.launcher.launches.load(Ordering::SeqCst), 0);
        assert!(!dir.path().join("application-0.log").exists());
        assert!(!lifecycle.teardown_armed());
    }

    #[tokio::test]
    async fn test_failed_file_wait_leaves_phase() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), 0)
            .with_server_command("/bin/sh", ["-c", "exec sleep 30"])
            .with_wait_policy(TimeoutPolicy::new(
                Duration::from_millis(200),
                Duration::from_millis(20),
            ));
        let mut lifecycle = ServerLifecycle::new(config).unwrap();

        let err = lifecycle
            .ensure_fresh_server(ScenarioState::new())
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(lifecycle.phase(), LifecyclePhase::AwaitingFileReady);
        assert!(!lifecycle.teardown_armed());
    }

    #[tokio::test]
    async fn test_teardown_without_setup_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut lifecycle = ServerLifecycle::new(config(dir.path(), 0)).unwrap();
        let mut state = ScenarioState::new();
        lifecycle.suite_teardown(&mut state).await.unwrap();
        assert_eq!(lifecycle.phase(), LifecyclePhase::Idle);
    }

    fn stubborn_config(dir: &std::path::Path, strict: bool) -> HarnessConfig {
        let mut config = config(dir, 0)
            .with_server_command("/bin/sh", ["-c", STUBBORN_SCRIPT])
            .with_ready_marker("Server up")
            .with_strict_stop(strict);
        config.stop_wait = TimeoutPolicy::new(Duration::from_millis(300), Duration::from_millis(20));
        config
    }

    #[tokio::test]
    async fn test_stale_stop_timeout_is_best_effort() {
        let dir = tempfile::tempdir().unwrap();
        let mut lifecycle = ServerLifecycle::new(stubborn_config(dir.path(), false)).unwrap();

        let first = lifecycle.ensure_fresh_server(ScenarioState::new()).await.unwrap();
        let first_pid = first.server_pid().unwrap();

        let mut second = lifecycle.ensure_fresh_server(first).await.unwrap();
        let second_pid = second.server_pid().unwrap();
        assert_ne!(first_pid, second_pid);
        assert_eq!(lifecycle.phase(), LifecyclePhase::Ready);

        lifecycle.suite_teardown(&mut second).await.unwrap();
        assert_eq!(lifecycle.phase(), LifecyclePhase::Idle);
    }

    #[tokio::test]
    async fn test_stale_stop_timeout_fails_when_strict() {
        let dir = tempfile::tempdir().unwrap();
        let mut lifecycle = ServerLifecycle::new(stubborn_config(dir.path(), true)).unwrap();

        let first = lifecycle.ensure_fresh_server(ScenarioState::new()).await.unwrap();
        let first_pid = first.server_pid().unwrap();

        let err = lifecycle.ensure_fresh_server(first).await.unwrap_err();
        match &err {
            LifecycleError::StaleStop { pid, .. } => assert_eq!(*pid, first_pid),
            other => panic!("expected StaleStop, got: {other:?}"),
        }
        assert!(err.is_timeout());
        assert_eq!(lifecycle.phase(), LifecyclePhase::Stopping);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(LifecyclePhase::AwaitingContentReady.to_string(), "awaiting-content-ready");
        assert_eq!(LifecyclePhase::default(), LifecyclePhase::Idle);
    }
}
