//! Docker-backed container engine
//!
//! Thin, fault-translating façade over the Docker Engine API via bollard.
//! Connectivity is established and verified once at startup; a failed
//! connect or ping is fatal to the subsystem because no lifecycle
//! operation can succeed without the engine.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::TryStreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::engine::ContainerEngine;
use crate::error::{ForgeError, Result};

/// Seconds bollard waits on the engine socket per call
const ENGINE_CALL_TIMEOUT_SECS: u64 = 120;

/// Container engine implementation backed by the Docker Engine API
///
/// # Examples
///
/// ```rust,no_run
/// use modelforge::orchestrator::DockerOrchestrator;
/// use std::time::Duration;
///
/// # async fn example() -> modelforge::Result<()> {
/// let engine = DockerOrchestrator::connect(
///     "unix:///var/run/docker.sock",
///     Duration::from_secs(300),
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
pub struct DockerOrchestrator {
    docker: Docker,
    pull_timeout: Duration,
}

impl DockerOrchestrator {
    /// Connects to the engine and verifies it answers a ping
    ///
    /// `engine_addr` accepts `unix://` socket paths and `tcp://`/`http://`
    /// addresses. This is fail-fast by design: a control plane that cannot
    /// reach its engine has nothing to orchestrate.
    pub async fn connect(engine_addr: &str, pull_timeout: Duration) -> Result<Self> {
        let docker = if engine_addr.starts_with("unix://") {
            Docker::connect_with_socket(engine_addr, ENGINE_CALL_TIMEOUT_SECS, API_DEFAULT_VERSION)
        } else {
            Docker::connect_with_http(engine_addr, ENGINE_CALL_TIMEOUT_SECS, API_DEFAULT_VERSION)
        }
        .map_err(|e| connect_failure(engine_addr, e))?;

        docker
            .ping()
            .await
            .map_err(|e| connect_failure(engine_addr, e))?;

        info!(engine_addr = %engine_addr, "container engine connectivity verified");

        Ok(Self {
            docker,
            pull_timeout,
        })
    }
}

#[async_trait]
impl ContainerEngine for DockerOrchestrator {
    async fn ensure_image(&self, image: &str) -> Result<()> {
        match self.docker.inspect_image(image).await {
            Ok(_) => {
                debug!(image = %image, "image already present locally, skipping pull");
                return Ok(());
            }
            Err(e) if is_not_found(&e) => {
                info!(image = %image, "image not found locally, pulling from registry");
            }
            Err(e) => return Err(engine_failure("inspect-image", image, e)),
        }

        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        let pull = async {
            let mut progress = self.docker.create_image(Some(options), None, None);
            while progress.try_next().await?.is_some() {}
            Ok::<(), DockerError>(())
        };

        match tokio::time::timeout(self.pull_timeout, pull).await {
            Ok(Ok(())) => {
                info!(image = %image, "image pulled");
                Ok(())
            }
            Ok(Err(e)) => Err(engine_failure("pull-image", image, e)),
            Err(_) => Err(ForgeError::orchestration(
                "pull-image",
                image,
                format!(
                    "image pull timed out after {}s",
                    self.pull_timeout.as_secs()
                ),
                None,
            )),
        }
    }

    async fn create_container(
        &self,
        image: &str,
        name: &str,
        port_map: &HashMap<u16, u16>,
        env: &HashMap<String, String>,
    ) -> Result<String> {
        info!(
            name = %name,
            image = %image,
            ports = ?port_map,
            "creating container"
        );

        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        for (host_port, container_port) in port_map {
            let key = format!("{}/tcp", container_port);
            exposed_ports.insert(key.clone(), HashMap::new());
            port_bindings.insert(
                key,
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: Some(host_port.to_string()),
                }]),
            );
        }

        let env_vars: Vec<String> = env
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();

        let config = Config {
            image: Some(image.to_string()),
            env: if env_vars.is_empty() {
                None
            } else {
                Some(env_vars)
            },
            exposed_ports: Some(exposed_ports),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                ..Default::default()
            }),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: name.to_string(),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| engine_failure("create-container", name, e))?;

        info!(container_id = %created.id, name = %name, "container created");
        Ok(created.id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| engine_failure("start-container", container_id, e))?;
        info!(container_id = %container_id, "container started");
        Ok(())
    }

    async fn stop_container(&self, container_id: &str, grace: Duration) -> Result<()> {
        let options = StopContainerOptions {
            t: grace.as_secs() as i64,
        };
        self.docker
            .stop_container(container_id, Some(options))
            .await
            .map_err(|e| engine_failure("stop-container", container_id, e))?;
        info!(container_id = %container_id, "container stopped");
        Ok(())
    }

    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.docker
            .remove_container(container_id, Some(options))
            .await
            .map_err(|e| engine_failure("remove-container", container_id, e))?;
        info!(container_id = %container_id, "container removed");
        Ok(())
    }

    async fn is_running(&self, container_id: &str) -> bool {
        match self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
        {
            Ok(details) => {
                let running = details
                    .state
                    .and_then(|state| state.running)
                    .unwrap_or(false);
                debug!(container_id = %container_id, running, "container liveness checked");
                running
            }
            Err(e) if is_not_found(&e) => {
                warn!(container_id = %container_id, "container not found during liveness check");
                false
            }
            Err(e) => {
                warn!(
                    container_id = %container_id,
                    error = %e,
                    "liveness check failed"
                );
                false
            }
        }
    }

    async fn tail_logs(&self, container_id: &str, lines: usize) -> Result<String> {
        debug!(container_id = %container_id, lines, "retrieving container logs");
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: lines.to_string(),
            ..Default::default()
        };

        let mut frames = self.docker.logs(container_id, Some(options));
        let mut output = String::new();
        while let Some(frame) = frames
            .try_next()
            .await
            .map_err(|e| engine_failure("container-logs", container_id, e))?
        {
            output.push_str(&frame.to_string());
        }
        Ok(output)
    }

    fn name(&self) -> &'static str {
        "docker"
    }
}

/// Wraps a bollard error with operation and target context
fn engine_failure(operation: &str, target: &str, err: DockerError) -> ForgeError {
    ForgeError::orchestration(operation, target, err.to_string(), Some(Box::new(err)))
}

/// Builds the fatal startup error for an unreachable engine
fn connect_failure(engine_addr: &str, err: DockerError) -> ForgeError {
    ForgeError::orchestration(
        "connect",
        engine_addr,
        format!(
            "failed to reach container engine at {}; is it running? ({})",
            engine_addr, err
        ),
        Some(Box::new(err)),
    )
}

/// Reports whether the engine answered 404 for the target
fn is_not_found(err: &DockerError) -> bool {
    matches!(
        err,
        DockerError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}
