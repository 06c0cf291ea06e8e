//! Backend lifecycle management
//!
//! Composes the registry and the container engine into atomic create and
//! delete workflows. Create is a linear pipeline with compensating rollback
//! on any step failure; delete is deliberately conservative and leaves the
//! registry entry intact when container removal is unconfirmed.
//!
//! This is the only component that issues orchestration commands; the
//! health monitor only reads container state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{ForgeError, Result};
use crate::orchestrator::ContainerEngine;
use crate::registry::{BackendRecord, CreateRequest, HealthStatus, ModelRegistry};

/// Grace period given to a container before it is killed on stop
const STOP_GRACE: Duration = Duration::from_secs(10);

/// Lifecycle manager for model backends
///
/// Dependencies are constructed once at process start and passed in by
/// handle — there are no ambient singletons.
///
/// # Examples
///
/// ```rust,no_run
/// use modelforge::{ModelManager, ModelRegistry};
/// use modelforge::orchestrator::{ContainerEngine, DockerOrchestrator};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> modelforge::Result<()> {
/// let registry = Arc::new(ModelRegistry::open("./data/registry.yml", 11400, 11500));
/// let engine: Arc<dyn ContainerEngine> = Arc::new(
///     DockerOrchestrator::connect("unix:///var/run/docker.sock", Duration::from_secs(300))
///         .await?,
/// );
/// let manager = ModelManager::new(registry, engine);
/// # let _ = manager;
/// # Ok(())
/// # }
/// ```
pub struct ModelManager {
    registry: Arc<ModelRegistry>,
    engine: Arc<dyn ContainerEngine>,
}

impl ModelManager {
    /// Creates a manager over the given registry and engine
    pub fn new(registry: Arc<ModelRegistry>, engine: Arc<dyn ContainerEngine>) -> Self {
        Self { registry, engine }
    }

    /// Creates a new model backend
    ///
    /// Pipeline: allocate port → resolve image and internal port → ensure
    /// image → create container → start container → derive endpoint →
    /// register record with health `starting`.
    ///
    /// On any failure the created container (if one exists) is stopped and
    /// removed best-effort, the allocated port's release intent is
    /// recorded, and the original cause is re-raised wrapped as
    /// [`ForgeError::Creation`]. No record is registered unless the whole
    /// pipeline completes.
    pub async fn create_backend(&self, request: CreateRequest) -> Result<BackendRecord> {
        request.validate()?;

        info!(
            model = %request.model_name,
            kind = %request.kind,
            "creating model backend"
        );

        let id = Uuid::new_v4().to_string();

        let port = match self.registry.allocate_port().await {
            Ok(port) => port,
            Err(cause) => {
                error!(model = %request.model_name, error = %cause, "failed to create model backend");
                return Err(ForgeError::creation(&request.model_name, true, cause));
            }
        };
        debug!(port, model = %request.model_name, "allocated port");

        let mut container_id: Option<String> = None;
        match self.provision(&request, &id, port, &mut container_id).await {
            Ok(record) => {
                info!(
                    id = %record.id,
                    endpoint = %record.endpoint,
                    "model backend created"
                );
                Ok(record)
            }
            Err(cause) => {
                error!(
                    model = %request.model_name,
                    error = %cause,
                    "failed to create model backend, rolling back"
                );
                let cleanup_completed = self.roll_back(container_id.as_deref(), port).await;
                Err(ForgeError::creation(
                    &request.model_name,
                    cleanup_completed,
                    cause,
                ))
            }
        }
    }

    /// Runs the fallible part of the create pipeline
    ///
    /// `container_id` is written as soon as the engine assigns one so the
    /// caller can clean up a container whose start failed.
    async fn provision(
        &self,
        request: &CreateRequest,
        id: &str,
        port: u16,
        container_id: &mut Option<String>,
    ) -> Result<BackendRecord> {
        let image = request.kind.resolve_image(request.custom_image.as_deref())?;
        let container_port = request.kind.container_port();
        info!(image = %image, container_port, "resolved backend image");

        self.engine.ensure_image(&image).await?;

        let mut port_map = HashMap::new();
        port_map.insert(port, container_port);

        let container_name = container_name(&request.model_name, id);
        let handle = self
            .engine
            .create_container(&image, &container_name, &port_map, &request.env)
            .await?;
        *container_id = Some(handle.clone());

        self.engine.start_container(&handle).await?;

        let record = BackendRecord {
            id: id.to_string(),
            model_name: request.model_name.clone(),
            kind: request.kind,
            container_id: handle,
            endpoint: request.kind.endpoint_url(port),
            port,
            created_at: SystemTime::now(),
            health: HealthStatus::Starting,
        };
        self.registry.register(record.clone()).await;

        Ok(record)
    }

    /// Best-effort compensation after a failed create
    ///
    /// Cleanup failures are logged but never mask the original error.
    /// Returns whether every attempted step succeeded.
    async fn roll_back(&self, container_id: Option<&str>, port: u16) -> bool {
        let mut completed = true;

        if let Some(container_id) = container_id {
            if let Err(e) = self.engine.stop_container(container_id, STOP_GRACE).await {
                warn!(
                    container_id = %container_id,
                    error = %e,
                    "failed to stop container during rollback"
                );
                completed = false;
            }
            if let Err(e) = self.engine.remove_container(container_id, true).await {
                warn!(
                    container_id = %container_id,
                    error = %e,
                    "failed to remove container during rollback"
                );
                completed = false;
            }
        }

        self.registry.release_port(port);
        completed
    }

    /// Deletes a model backend
    ///
    /// Stops the container with a bounded grace period, force-removes it,
    /// releases the port intent, and unregisters the record. If stop or
    /// remove fails the registry entry is left intact — the record still
    /// reflects a container that may or may not be gone, and retrying the
    /// delete is the recovery path.
    pub async fn delete_backend(&self, id: &str) -> Result<()> {
        info!(id = %id, "deleting model backend");

        let record = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| ForgeError::not_found(id))?;

        let teardown = async {
            self.engine
                .stop_container(&record.container_id, STOP_GRACE)
                .await?;
            self.engine.remove_container(&record.container_id, true).await
        };
        if let Err(cause) = teardown.await {
            error!(id = %id, error = %cause, "failed to delete model backend");
            return Err(ForgeError::deletion(id, cause));
        }

        self.registry.release_port(record.port);
        self.registry.unregister(id).await;

        info!(id = %id, model = %record.model_name, "model backend deleted");
        Ok(())
    }

    /// Lists all registered backends
    pub async fn list_backends(&self) -> Vec<BackendRecord> {
        self.registry.list_all().await
    }

    /// Returns the record for `id`
    pub async fn get_backend(&self, id: &str) -> Result<BackendRecord> {
        self.registry
            .get(id)
            .await
            .ok_or_else(|| ForgeError::not_found(id))
    }

    /// Re-checks a backend's health against the live container state
    ///
    /// Applies the same transition rule as the background monitor but
    /// synchronously, for callers that need a fresh read rather than
    /// waiting for the next sweep. Persists only when the status changed.
    pub async fn check_health(&self, id: &str) -> Result<HealthStatus> {
        let record = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| ForgeError::not_found(id))?;

        let running = self.engine.is_running(&record.container_id).await;
        let current = if running {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };

        if record.health != current {
            self.registry.update_health(id, current).await;
        }

        Ok(current)
    }

    /// Returns the last `lines` lines of a backend's container logs
    ///
    /// Diagnostic aid only; the output feeds no control decision.
    pub async fn backend_logs(&self, id: &str, lines: usize) -> Result<String> {
        let record = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| ForgeError::not_found(id))?;
        self.engine.tail_logs(&record.container_id, lines).await
    }
}

/// Builds the unique container name for a backend
///
/// Model names may contain characters Docker rejects; anything outside
/// `[a-zA-Z0-9_.-]` is replaced before the short id is appended.
fn container_name(model_name: &str, id: &str) -> String {
    let sanitized: String = model_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let short_id = &id[..id.len().min(8)];
    format!("llm-{}-{}", sanitized, short_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_name_sanitizes_model_names() {
        let name = container_name("mistral:7b-instruct", "11112222-3333");
        assert_eq!(name, "llm-mistral-7b-instruct-11112222");
        assert!(name.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
        }));
    }

    #[test]
    fn container_name_handles_short_ids() {
        let name = container_name("m", "abc");
        assert_eq!(name, "llm-m-abc");
    }
}
