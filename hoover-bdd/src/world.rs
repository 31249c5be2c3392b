//! Cucumber world for the cleaning-sessions features.

use std::sync::Arc;

use anyhow::{Context, Result};
use cucumber::World;

use crate::session::{self, WorkerSession};

/// Per-scenario world. Scenario data lives in the worker session so that it
/// survives world re-creation between scenarios.
#[derive(Debug, World)]
#[world(init = Self::new)]
pub struct HooverWorld {
    session: Option<Arc<WorkerSession>>,
}

impl HooverWorld {
    fn new() -> Self {
        Self {
            session: session::current(),
        }
    }

    pub fn session(&self) -> Result<Arc<WorkerSession>> {
        self.session
            .clone()
            .context("worker session not installed before running features")
    }

    /// Clears the request under construction and the last response.
    pub async fn reset_exchange(&self) {
        if let Some(session) = &self.session {
            session.state().await.reset_exchange();
        }
    }
}
