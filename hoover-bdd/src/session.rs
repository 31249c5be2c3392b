//! Worker-wide state that outlives individual scenarios.
//!
//! Cucumber rebuilds the world for every scenario, but the server process
//! started by one scenario must be stopped by the next. The session holds it
//! for the lifetime of the worker process.

use std::fmt;
use std::sync::{Arc, OnceLock};

use anyhow::{Result, bail};
use hoover_common::{LifecycleResult, ScenarioState, ServerLifecycle};
use tokio::sync::{Mutex, MutexGuard};

use crate::client::CleaningClient;

static SESSION: OnceLock<Arc<WorkerSession>> = OnceLock::new();

/// Lifecycle, scenario state and HTTP client of one worker.
///
/// Lock order is lifecycle before state.
pub struct WorkerSession {
    lifecycle: Mutex<ServerLifecycle>,
    state: Mutex<ScenarioState>,
    client: CleaningClient,
}

impl fmt::Debug for WorkerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerSession")
            .field("base_uri", &self.client.base_uri())
            .finish_non_exhaustive()
    }
}

impl WorkerSession {
    pub fn new(lifecycle: ServerLifecycle, client: CleaningClient) -> Self {
        Self {
            lifecycle: Mutex::new(lifecycle),
            state: Mutex::new(ScenarioState::new()),
            client,
        }
    }

    pub fn client(&self) -> &CleaningClient {
        &self.client
    }

    pub async fn state(&self) -> MutexGuard<'_, ScenarioState> {
        self.state.lock().await
    }

    /// Replaces the scenario state with one backed by a freshly started server.
    pub async fn fresh_server(&self) -> LifecycleResult<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        let mut state = self.state.lock().await;
        let previous = std::mem::take(&mut *state);
        *state = lifecycle.ensure_fresh_server(previous).await?;
        Ok(())
    }

    /// Stops the current server, if any.
    pub async fn shutdown(&self) -> LifecycleResult<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        let mut state = self.state.lock().await;
        lifecycle.ensure_shutdown(&mut state).await
    }

    /// Suite teardown, run once after all features.
    pub async fn teardown(&self) -> LifecycleResult<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        let mut state = self.state.lock().await;
        lifecycle.suite_teardown(&mut state).await
    }
}

/// Registers the session for this worker. Only one may be installed.
pub fn install(session: WorkerSession) -> Result<Arc<WorkerSession>> {
    let session = Arc::new(session);
    if SESSION.set(Arc::clone(&session)).is_err() {
        bail!("worker session already installed");
    }
    Ok(session)
}

/// The installed session, if any.
pub fn current() -> Option<Arc<WorkerSession>> {
    SESSION.get().cloned()
}
