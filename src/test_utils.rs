//! Test Utilities
//!
//! Common test infrastructure shared across the test suite: a scripted
//! in-memory [`ContainerEngine`] with per-operation fault injection and an
//! operation log for asserting what the workflows actually did.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{ForgeError, Result};
use crate::orchestrator::ContainerEngine;

#[derive(Default)]
struct MockState {
    next_container: u64,
    /// container id -> running flag
    containers: HashMap<String, bool>,
    /// (operation, target) in call order
    operations: Vec<(String, String)>,
    /// operations scripted to fail
    failures: HashSet<String>,
}

/// Scripted in-memory container engine
///
/// Containers are plain entries in a map with a running flag. Any operation
/// can be scripted to fail by name (`"ensure_image"`, `"create"`,
/// `"start"`, `"stop"`, `"remove"`, `"is_running"`, `"logs"`), and every
/// call is recorded so tests can assert on cleanup behavior.
///
/// A scripted `"is_running"` failure reports `false` rather than erroring,
/// matching the engine contract that a failed liveness query reads as "not
/// running".
#[derive(Default)]
pub struct MockEngine {
    state: Mutex<MockState>,
}

impl MockEngine {
    /// Creates an engine with no containers and no scripted failures
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the named operation to fail on every subsequent call
    pub fn fail_on(&self, operation: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(operation.to_string());
    }

    /// Clears all scripted failures
    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    /// Overrides the running flag of a container
    pub fn set_running(&self, container_id: &str, running: bool) {
        if let Some(flag) = self
            .state
            .lock()
            .unwrap()
            .containers
            .get_mut(container_id)
        {
            *flag = running;
        }
    }

    /// Number of containers the engine currently knows about
    pub fn container_count(&self) -> usize {
        self.state.lock().unwrap().containers.len()
    }

    /// Snapshot of the (operation, target) call log
    pub fn operations(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().operations.clone()
    }

    /// Number of recorded calls to the named operation
    pub fn op_count(&self, operation: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .operations
            .iter()
            .filter(|(op, _)| op == operation)
            .count()
    }

    fn record(&self, operation: &str, target: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        state
            .operations
            .push((operation.to_string(), target.to_string()));
        state.failures.contains(operation)
    }
}

#[async_trait]
impl ContainerEngine for MockEngine {
    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.record("ensure_image", image) {
            return Err(ForgeError::orchestration(
                "pull-image",
                image,
                "injected pull failure",
                None,
            ));
        }
        Ok(())
    }

    async fn create_container(
        &self,
        image: &str,
        name: &str,
        _port_map: &HashMap<u16, u16>,
        _env: &HashMap<String, String>,
    ) -> Result<String> {
        if self.record("create", name) {
            return Err(ForgeError::orchestration(
                "create-container",
                name,
                format!("injected create failure for image {}", image),
                None,
            ));
        }
        let mut state = self.state.lock().unwrap();
        state.next_container += 1;
        let container_id = format!("{:064x}", state.next_container);
        state.containers.insert(container_id.clone(), false);
        Ok(container_id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        if self.record("start", container_id) {
            return Err(ForgeError::orchestration(
                "start-container",
                container_id,
                "injected start failure",
                None,
            ));
        }
        let mut state = self.state.lock().unwrap();
        match state.containers.get_mut(container_id) {
            Some(running) => {
                *running = true;
                Ok(())
            }
            None => Err(ForgeError::orchestration(
                "start-container",
                container_id,
                "no such container",
                None,
            )),
        }
    }

    async fn stop_container(&self, container_id: &str, _grace: Duration) -> Result<()> {
        if self.record("stop", container_id) {
            return Err(ForgeError::orchestration(
                "stop-container",
                container_id,
                "injected stop failure",
                None,
            ));
        }
        let mut state = self.state.lock().unwrap();
        match state.containers.get_mut(container_id) {
            Some(running) => {
                *running = false;
                Ok(())
            }
            None => Err(ForgeError::orchestration(
                "stop-container",
                container_id,
                "no such container",
                None,
            )),
        }
    }

    async fn remove_container(&self, container_id: &str, _force: bool) -> Result<()> {
        if self.record("remove", container_id) {
            return Err(ForgeError::orchestration(
                "remove-container",
                container_id,
                "injected remove failure",
                None,
            ));
        }
        let mut state = self.state.lock().unwrap();
        match state.containers.remove(container_id) {
            Some(_) => Ok(()),
            None => Err(ForgeError::orchestration(
                "remove-container",
                container_id,
                "no such container",
                None,
            )),
        }
    }

    async fn is_running(&self, container_id: &str) -> bool {
        if self.record("is_running", container_id) {
            // A failed liveness query reads as "not running"
            return false;
        }
        self.state
            .lock()
            .unwrap()
            .containers
            .get(container_id)
            .copied()
            .unwrap_or(false)
    }

    async fn tail_logs(&self, container_id: &str, lines: usize) -> Result<String> {
        if self.record("logs", container_id) {
            return Err(ForgeError::orchestration(
                "container-logs",
                container_id,
                "injected logs failure",
                None,
            ));
        }
        Ok(format!("last {} lines of {}", lines, container_id))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
