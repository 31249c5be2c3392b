//! Harness configuration assembled from the environment.

use std::fmt;
use std::path::PathBuf;

use tracing::debug;

use super::env::{EnvError, EnvParser};
use crate::timeout::{DEFAULT_POLL_INTERVAL, TimeoutPolicy};
use crate::worker::{
    DEFAULT_BASE_DEBUG_PORT, DEFAULT_BASE_PORT, DEFAULT_LOG_DIR, PortAllocator, ReadinessTarget,
    WorkerId,
};

/// Default program launched as the server under test.
pub const DEFAULT_SERVER_COMMAND: &str = "./start_server_locally.sh";

/// Default line the server logs once it accepts requests.
pub const DEFAULT_READY_MARKER: &str = "Started AppRunner in ";

/// Default service URI template; `%s` is replaced by the worker's port.
pub const DEFAULT_BASE_URI_TEMPLATE: &str = "http://localhost:%s";

/// How much of the server lifecycle the harness owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerManagement {
    /// Stop, launch and await the server for every scenario.
    #[default]
    Managed,
    /// The server is started elsewhere: never spawn or kill, only await
    /// readiness.
    External,
    /// No lifecycle work at all; only the scenario state is reset.
    Disabled,
}

impl ServerManagement {
    /// `NO_SERVER_MANAGEMENT` wins over `SERVER_IS_EXTERNAL`.
    pub fn from_flags(no_management: bool, external: bool) -> Self {
        match (no_management, external) {
            (true, _) => Self::Disabled,
            (false, true) => Self::External,
            (false, false) => Self::Managed,
        }
    }

    /// Whether the harness spawns and terminates the server itself.
    pub fn owns_process(self) -> bool {
        self == Self::Managed
    }
}

impl fmt::Display for ServerManagement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Managed => write!(f, "managed"),
            Self::External => write!(f, "external"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// Everything one worker needs to drive the server under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    pub worker: WorkerId,
    pub management: ServerManagement,
    pub server_command: PathBuf,
    pub server_args: Vec<String>,
    pub log_dir: PathBuf,
    /// Overrides the worker-derived readiness file.
    pub readiness_file: Option<PathBuf>,
    pub ready_marker: String,
    pub ports: PortAllocator,
    pub file_wait: TimeoutPolicy,
    pub log_wait: TimeoutPolicy,
    pub stop_wait: TimeoutPolicy,
    /// Fail the scenario when the previous server cannot be stopped.
    pub strict_stop: bool,
    pub base_uri_template: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            worker: WorkerId::MAIN,
            management: ServerManagement::Managed,
            server_command: PathBuf::from(DEFAULT_SERVER_COMMAND),
            server_args: Vec::new(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            readiness_file: None,
            ready_marker: DEFAULT_READY_MARKER.to_string(),
            ports: PortAllocator::default(),
            file_wait: TimeoutPolicy::readiness_file(),
            log_wait: TimeoutPolicy::log_content(),
            stop_wait: TimeoutPolicy::process_exit(),
            strict_stop: false,
            base_uri_template: DEFAULT_BASE_URI_TEMPLATE.to_string(),
        }
    }
}

impl HarnessConfig {
    /// Reads the configuration from the process environment.
    ///
    /// All invalid variables are reported together.
    pub fn from_env() -> Result<Self, Vec<EnvError>> {
        let defaults = Self::default();
        let mut plain = EnvParser::unprefixed();
        let mut env = EnvParser::new();

        let no_management = plain.get_bool("NO_SERVER_MANAGEMENT", false);
        let external = plain.get_bool("SERVER_IS_EXTERNAL", false);
        let readiness_file = plain.get_optional_path("SERVER_RESTART_TRIGGER_FILE");
        let base_uri_template = plain.get_string("TARGET_BASE_URI", DEFAULT_BASE_URI_TEMPLATE);

        let worker = env.get_u32_range("WORKER_ID", 0, 0, u32::MAX);
        let server_command = env.get_path("SERVER_COMMAND", DEFAULT_SERVER_COMMAND, false);
        let server_args = env.get_string_list("SERVER_ARGS", Vec::new());
        let log_dir = env.get_path("LOG_DIR", DEFAULT_LOG_DIR, false);
        let ready_marker = env.get_string("READY_MARKER", DEFAULT_READY_MARKER);
        let base_port = env.get_u16_range("BASE_PORT", DEFAULT_BASE_PORT, 1, u16::MAX);
        let base_debug_port =
            env.get_u16_range("BASE_DEBUG_PORT", DEFAULT_BASE_DEBUG_PORT, 1, u16::MAX);
        let file_timeout = env.get_duration("READY_FILE_TIMEOUT", defaults.file_wait.timeout);
        let log_timeout = env.get_duration("READY_LOG_TIMEOUT", defaults.log_wait.timeout);
        let stop_timeout = env.get_duration("STOP_TIMEOUT", defaults.stop_wait.timeout);
        let poll_interval = env.get_duration("POLL_INTERVAL", DEFAULT_POLL_INTERVAL);
        let strict_stop = env.get_bool("STRICT_STOP", false);

        let mut errors = plain.take_errors();
        errors.extend(env.take_errors());
        if ready_marker.value.is_empty() {
            errors.push(EnvError::InvalidValue {
                var: "HOOVER_READY_MARKER".to_string(),
                expected: "non-empty marker string".to_string(),
                value: String::new(),
            });
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        debug!(
            worker = %worker,
            management = %ServerManagement::from_flags(no_management.value, external.value),
            log_dir = %log_dir.value.display(),
            server_command = %server_command.value.display(),
            poll_interval = %humantime::format_duration(poll_interval.value),
            "Harness configuration loaded"
        );

        Ok(Self {
            worker: WorkerId::new(worker.value),
            management: ServerManagement::from_flags(no_management.value, external.value),
            server_command: server_command.value,
            server_args: server_args.value,
            log_dir: log_dir.value,
            readiness_file: readiness_file.value,
            ready_marker: ready_marker.value,
            ports: PortAllocator::new(base_port.value, base_debug_port.value),
            file_wait: TimeoutPolicy::new(file_timeout.value, poll_interval.value),
            log_wait: TimeoutPolicy::new(log_timeout.value, poll_interval.value),
            stop_wait: TimeoutPolicy::new(stop_timeout.value, poll_interval.value),
            strict_stop: strict_stop.value,
            base_uri_template: base_uri_template.value,
        })
    }

    pub fn with_worker(mut self, worker: WorkerId) -> Self {
        self.worker = worker;
        self
    }

    pub fn with_management(mut self, management: ServerManagement) -> Self {
        self.management = management;
        self
    }

    pub fn with_server_command<I, S>(mut self, program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.server_command = program.into();
        self.server_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }

    pub fn with_readiness_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.readiness_file = Some(path.into());
        self
    }

    pub fn with_ready_marker(mut self, marker: impl Into<String>) -> Self {
        self.ready_marker = marker.into();
        self
    }

    pub fn with_ports(mut self, ports: PortAllocator) -> Self {
        self.ports = ports;
        self
    }

    /// Applies one policy to all three waits.
    pub fn with_wait_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.file_wait = policy;
        self.log_wait = policy;
        self.stop_wait = policy;
        self
    }

    pub fn with_strict_stop(mut self, strict: bool) -> Self {
        self.strict_stop = strict;
        self
    }

    /// The readiness file this worker waits on.
    pub fn readiness_target(&self) -> ReadinessTarget {
        ReadinessTarget::resolve(self.readiness_file.as_deref(), &self.log_dir, self.worker)
    }

    /// Service base URI for `port`, with any trailing slash removed.
    pub fn base_uri(&self, port: u16) -> String {
        self.base_uri_template
            .replacen("%s", &port.to_string(), 1)
            .trim_end_matches('/')
            .to_string()
    }
}
