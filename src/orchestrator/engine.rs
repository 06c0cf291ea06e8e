//! Container engine abstraction
//!
//! The [`ContainerEngine`] trait is the seam between lifecycle workflows
//! and the concrete engine client, which keeps the workflows testable
//! against a scripted in-memory implementation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::Result;

/// Trait for container engine implementations
///
/// All operations are awaited to the engine's synchronous acknowledgement
/// (fire-and-confirm); none of them retries internally. Failures are
/// normalized into [`crate::error::ForgeError::Orchestration`] carrying the
/// attempted operation and its target.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Ensures an image is present locally, pulling it if missing
    ///
    /// A no-op when the image already exists. Pulls are bounded by the
    /// configured timeout; a timeout and a pull error are reported under
    /// the same error kind with distinguishing messages.
    async fn ensure_image(&self, image: &str) -> Result<()>;

    /// Creates a container and returns the engine-assigned container id
    ///
    /// # Arguments
    ///
    /// * `image` - Image reference to run
    /// * `name` - Unique container name
    /// * `port_map` - Host port to container-internal port mapping
    /// * `env` - Environment variables injected into the container
    async fn create_container(
        &self,
        image: &str,
        name: &str,
        port_map: &HashMap<u16, u16>,
        env: &HashMap<String, String>,
    ) -> Result<String>;

    /// Starts a created container
    async fn start_container(&self, container_id: &str) -> Result<()>;

    /// Stops a container, allowing it `grace` to shut down cleanly
    async fn stop_container(&self, container_id: &str, grace: Duration) -> Result<()>;

    /// Removes a container, optionally forcing removal while running
    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()>;

    /// Reports whether the engine sees the container's process as running
    ///
    /// A missing container and a failed query both report `false`: neither
    /// state is servable from the caller's perspective.
    async fn is_running(&self, container_id: &str) -> bool;

    /// Returns the last `lines` lines of combined stdout/stderr
    ///
    /// Best-effort diagnostic aid; never used in a control decision.
    async fn tail_logs(&self, container_id: &str, lines: usize) -> Result<String>;

    /// Returns the name of this engine implementation
    fn name(&self) -> &'static str;
}
