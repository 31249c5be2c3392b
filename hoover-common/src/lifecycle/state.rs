//! Per-scenario test state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::process::ManagedProcess;

/// Status and decoded body of the last HTTP exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedResponse {
    pub status: u16,
    /// JSON body, or `Value::Null` when the body was empty or not JSON.
    pub body: Value,
}

impl RecordedResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// State owned by exactly one scenario on one worker.
///
/// Replaced wholesale at the start of every scenario. The server process is
/// only reachable through the lifecycle orchestrator.
#[derive(Debug, Default)]
pub struct ScenarioState {
    /// Request body under construction.
    pub request: Map<String, Value>,
    /// Last response received from the service.
    pub response: Option<RecordedResponse>,
    server_process: Option<ManagedProcess>,
}

impl ScenarioState {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_process(process: Option<ManagedProcess>) -> Self {
        Self {
            server_process: process,
            ..Self::default()
        }
    }

    pub(crate) fn take_server_process(&mut self) -> Option<ManagedProcess> {
        self.server_process.take()
    }

    pub fn has_server_process(&self) -> bool {
        self.server_process.is_some()
    }

    pub fn server_pid(&self) -> Option<u32> {
        self.server_process.as_ref().map(ManagedProcess::pid)
    }

    /// Clears the request and response, keeping the server.
    pub fn reset_exchange(&mut self) {
        self.request.clear();
        self.response = None;
    }
}
