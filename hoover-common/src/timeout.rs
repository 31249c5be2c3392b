//! Timeout policies for bounded waits.
//!
//! Every wait in the lifecycle takes a [`TimeoutPolicy`]; there is no
//! unbounded wait anywhere in the crate.

use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior};

/// Default interval between polls of a file or process.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default bound on waiting for a terminated process to exit.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on waiting for the readiness file to be created.
pub const DEFAULT_READY_FILE_TIMEOUT: Duration = Duration::from_secs(20);

/// Default bound on waiting for the readiness marker to be logged.
pub const DEFAULT_READY_LOG_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout and polling interval governing a single wait operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    /// Maximum time the wait may take before failing.
    pub timeout: Duration,
    /// Interval between successive polls.
    pub poll_interval: Duration,
}

impl TimeoutPolicy {
    pub const fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    /// Policy for waiting on process exit: 10s / 100ms.
    pub const fn process_exit() -> Self {
        Self::new(DEFAULT_STOP_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }

    /// Policy for waiting on the readiness file: 20s / 100ms.
    pub const fn readiness_file() -> Self {
        Self::new(DEFAULT_READY_FILE_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }

    /// Policy for waiting on the readiness marker: 30s / 100ms.
    pub const fn log_content() -> Self {
        Self::new(DEFAULT_READY_LOG_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the polling interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Interval ticker for this policy. The first tick completes immediately.
    ///
    /// A zero poll interval is clamped to one millisecond.
    pub(crate) fn ticker(&self) -> Interval {
        let period = self.poll_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }
}
