//! Spawning the server under test with its output forwarded to tracing.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{Instrument, debug, info, warn};

use super::ProcessHandle;
use crate::errors::{LifecycleError, LifecycleResult};
use crate::worker::{WorkerContext, WorkerId};

/// Which output stream of the child a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// Program, arguments and environment overrides for one launch.
///
/// The child inherits the harness environment; `env` entries are layered on
/// top of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub env: BTreeMap<String, String>,
    pub current_dir: Option<PathBuf>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

/// Handle to a server process spawned by the harness.
///
/// Dropping the handle kills the process, so a handle released without a
/// confirmed exit never leaves an orphaned server holding its port.
#[derive(Debug)]
pub struct ManagedProcess {
    pid: u32,
    worker: WorkerId,
    started_at: Instant,
    exit_status: Option<ExitStatus>,
    child: Child,
}

impl ManagedProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Time since the process was spawned.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Exit status if it has already been observed.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }
}

impl ProcessHandle for ManagedProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn request_termination(&mut self) -> io::Result<()> {
        if self.try_exit_status()?.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("process {} has already exited", self.pid),
            ));
        }
        send_terminate(&mut self.child, self.pid)
    }

    fn try_exit_status(&mut self) -> io::Result<Option<ExitStatus>> {
        if let Some(status) = self.exit_status {
            return Ok(Some(status));
        }
        let status = self.child.try_wait()?;
        if let Some(status) = status {
            debug!(
                worker = %self.worker,
                pid = self.pid,
                %status,
                uptime_ms = self.started_at.elapsed().as_millis() as u64,
                "Server process exited"
            );
            self.exit_status = Some(status);
        }
        Ok(status)
    }
}

/// Sends SIGTERM through `kill(1)`, falling back to a hard kill when the
/// command itself cannot be run. Pid 0 would address the harness's own
/// process group and is refused.
#[cfg(unix)]
fn send_terminate(child: &mut Child, pid: u32) -> io::Result<()> {
    if pid == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "refusing to signal pid 0",
        ));
    }
    match std::process::Command::new("kill")
        .arg("-TERM")
        .arg(pid.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(io::Error::other(format!(
            "kill -TERM {pid} exited with {status}"
        ))),
        Err(e) => {
            debug!(pid, error = %e, "kill(1) unavailable, forcing kill");
            child.start_kill()
        }
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child, _pid: u32) -> io::Result<()> {
    child.start_kill()
}

/// Spawns `spec` and returns immediately with a handle to the child.
///
/// stdin is closed; stdout and stderr are forwarded line by line to tracing
/// (stdout at info, stderr at warn) inside the worker's span for as long as
/// the child keeps them open. Must be called from within a tokio runtime.
pub fn spawn_supervised(spec: &LaunchSpec, ctx: &WorkerContext) -> LifecycleResult<ManagedProcess> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.current_dir {
        command.current_dir(dir);
    }

    let mut child = command.spawn().map_err(|source| LifecycleError::Spawn {
        program: spec.program.clone(),
        source,
    })?;
    let pid = child.id().ok_or_else(|| LifecycleError::Spawn {
        program: spec.program.clone(),
        source: io::Error::other("child exited before its pid was read"),
    })?;
    let worker = ctx.worker();

    info!(
        worker = %worker,
        pid,
        program = %spec.program.display(),
        "Server process spawned"
    );

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(
            forward_lines(stdout, OutputStream::Stdout, worker, pid).instrument(ctx.span().clone()),
        );
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(
            forward_lines(stderr, OutputStream::Stderr, worker, pid).instrument(ctx.span().clone()),
        );
    }

    Ok(ManagedProcess {
        pid,
        worker,
        started_at: Instant::now(),
        exit_status: None,
        child,
    })
}

async fn forward_lines<R>(reader: R, stream: OutputStream, worker: WorkerId, pid: u32)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']);
                match stream {
                    OutputStream::Stdout => {
                        info!(worker = %worker, pid, %stream, "service {stream}: {line}")
                    }
                    OutputStream::Stderr => {
                        warn!(worker = %worker, pid, %stream, "service {stream}: {line}")
                    }
                }
            }
            Err(e) => {
                debug!(worker = %worker, pid, %stream, error = %e, "Output stream closed");
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn ctx() -> WorkerContext {
        WorkerContext::new(WorkerId::new(7))
    }

    #[test]
    fn test_launch_spec_builder() {
        let spec = LaunchSpec::new("/bin/sh")
            .arg("-c")
            .args(["exit 0"])
            .env("SERVER_PORT", "8087")
            .current_dir("/tmp");
        assert_eq!(spec.program, PathBuf::from("/bin/sh"));
        assert_eq!(spec.args, vec![OsString::from("-c"), OsString::from("exit 0")]);
        assert_eq!(spec.env.get("SERVER_PORT").map(String::as_str), Some("8087"));
        assert_eq!(spec.current_dir, Some(PathBuf::from("/tmp")));
    }

    #[tokio::test]
    async fn test_spawn_missing_program_is_spawn_error() {
        let spec = LaunchSpec::new("/definitely/not/a/real/server");
        let err = spawn_supervised(&spec, &ctx()).unwrap_err();
        match err {
            LifecycleError::Spawn { program, source } => {
                assert_eq!(program, PathBuf::from("/definitely/not/a/real/server"));
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("expected Spawn, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_spawn_passes_environment() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("env.txt");
        let spec = LaunchSpec::new("/bin/sh")
            .arg("-c")
            .arg("printf '%s' \"$SERVER_PORT\" > \"$OUT_FILE\"")
            .env("SERVER_PORT", "8087")
            .env("OUT_FILE", out.display().to_string());
        let mut process = spawn_supervised(&spec, &ctx()).unwrap();
        assert!(process.pid() > 0);
        assert_eq!(process.worker(), WorkerId::new(7));

        let deadline = Instant::now() + Duration::from_secs(5);
        while process.try_exit_status().unwrap().is_none() {
            assert!(Instant::now() < deadline, "child did not exit");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(process.exit_status().unwrap().success());
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "8087");
    }

    #[tokio::test]
    async fn test_termination_of_exited_process_reports_error() {
        let spec = LaunchSpec::new("/bin/sh").arg("-c").arg("exit 3");
        let mut process = spawn_supervised(&spec, &ctx()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while process.try_exit_status().unwrap().is_none() {
            assert!(Instant::now() < deadline, "child did not exit");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(process.exit_status().unwrap().code(), Some(3));
        let err = process.request_termination().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_terminate_refuses_pid_zero() {
        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg("exec sleep 30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let err = send_terminate(&mut child, 0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(child.try_wait().unwrap().is_none(), "child must not be signalled");
    }

    #[tokio::test]
    async fn test_forward_lines_drains_non_utf8_output() {
        let bytes: &[u8] = b"first\n\xff\xfe second\nlast-without-newline";
        forward_lines(bytes, OutputStream::Stdout, WorkerId::MAIN, 1).await;
    }
}
