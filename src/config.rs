//! # Control Plane Configuration
//!
//! Configuration for the Modelforge control plane with validation and
//! environment variable support.
//!
//! ## Configuration Sources (precedence order)
//!
//! 1. Command line arguments (highest priority)
//! 2. Environment variables (MODELFORGE_*)
//! 3. Compiled defaults (lowest priority)
//!
//! All configuration is validated before any subsystem starts; a process
//! never comes up with a config that fails these checks.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ForgeError, Result};

/// Main configuration for the control plane
///
/// ## Example (defaults)
///
/// ```rust
/// use modelforge::ControlPlaneConfig;
///
/// let config = ControlPlaneConfig::default();
/// assert_eq!(config.port_range_start, 11400);
/// assert_eq!(config.port_range_end, 11500);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlPlaneConfig {
    /// Address to bind the control API to
    ///
    /// **Default**: `127.0.0.1:8080`
    /// **Environment**: `MODELFORGE_LISTEN_ADDR`
    pub listen_addr: SocketAddr,

    /// Container engine address
    ///
    /// **Default**: `unix:///var/run/docker.sock`
    /// **Environment**: `MODELFORGE_DOCKER_HOST`
    ///
    /// Accepts a `unix://` socket path or a `tcp://`/`http://` address.
    /// Connectivity is verified once at startup and is fatal if it fails.
    pub docker_host: String,

    /// Maximum time to wait for an image pull to complete
    ///
    /// **Default**: `300 seconds`
    /// **Environment**: `MODELFORGE_IMAGE_PULL_TIMEOUT_SECS`
    ///
    /// Image pulls are the only engine calls with an explicit timeout;
    /// everything else relies on the engine's own acknowledgement.
    pub image_pull_timeout: Duration,

    /// First host port handed to backends
    ///
    /// **Default**: `11400`
    /// **Environment**: `MODELFORGE_PORT_RANGE_START`
    pub port_range_start: u16,

    /// Last host port handed to backends (inclusive)
    ///
    /// **Default**: `11500`
    /// **Environment**: `MODELFORGE_PORT_RANGE_END`
    ///
    /// Ports are issued monotonically and never recycled within a process
    /// run, so the range bounds the number of creates a single run can
    /// serve.
    pub port_range_end: u16,

    /// Enable the background health sweep
    ///
    /// **Default**: `true`
    /// **Environment**: `MODELFORGE_HEALTH_CHECK_ENABLED`
    pub health_check_enabled: bool,

    /// Interval between health sweeps
    ///
    /// **Default**: `30 seconds`
    /// **Environment**: `MODELFORGE_HEALTH_CHECK_INTERVAL_SECS`
    ///
    /// Sweeps never overlap; a slow sweep defers the next one.
    pub health_check_interval: Duration,

    /// Delay before the first health sweep
    ///
    /// **Default**: `10 seconds`
    /// **Environment**: `MODELFORGE_HEALTH_CHECK_INITIAL_DELAY_SECS`
    ///
    /// Gives freshly started containers a moment before the first
    /// liveness verdict.
    pub health_check_initial_delay: Duration,

    /// Registry snapshot file path
    ///
    /// **Default**: `./data/registry.yml`
    /// **Environment**: `MODELFORGE_REGISTRY_FILE`
    ///
    /// The previous generation is kept at a `.bak` sibling.
    pub registry_file: PathBuf,

    /// Logging level (error, warn, info, debug, trace)
    ///
    /// **Default**: `info`
    /// **Environment**: `MODELFORGE_LOG_LEVEL`
    pub log_level: String,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080"
                .parse()
                .expect("default listen address should be valid"),
            docker_host: "unix:///var/run/docker.sock".to_string(),
            image_pull_timeout: Duration::from_secs(300),
            port_range_start: 11400,
            port_range_end: 11500,
            health_check_enabled: true,
            health_check_interval: Duration::from_secs(30),
            health_check_initial_delay: Duration::from_secs(10),
            registry_file: PathBuf::from("./data/registry.yml"),
            log_level: "info".to_string(),
        }
    }
}

impl ControlPlaneConfig {
    /// Validates the configuration for consistency
    ///
    /// # Validation Rules
    ///
    /// - The port range must not be inverted
    /// - The engine address must not be blank
    /// - The pull timeout and health interval must be at least one second
    /// - The registry file path must name a file
    /// - The log level must be one of the known levels
    pub fn validate(&self) -> Result<()> {
        if self.port_range_start > self.port_range_end {
            return Err(ForgeError::configuration(format!(
                "port range is inverted: start {} > end {}",
                self.port_range_start, self.port_range_end
            )));
        }

        if self.docker_host.trim().is_empty() {
            return Err(ForgeError::configuration("docker_host must not be blank"));
        }

        if self.image_pull_timeout < Duration::from_secs(1) {
            return Err(ForgeError::configuration(
                "image_pull_timeout must be at least 1 second",
            ));
        }

        if self.health_check_interval < Duration::from_secs(1) {
            return Err(ForgeError::configuration(
                "health_check_interval must be at least 1 second",
            ));
        }

        if self.registry_file.file_name().is_none() {
            return Err(ForgeError::configuration("registry_file must name a file"));
        }

        match self.log_level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            other => {
                return Err(ForgeError::configuration(format!(
                    "invalid log_level: {}",
                    other
                )));
            }
        }

        Ok(())
    }

    /// Number of ports the configured range can ever hand out
    pub fn port_capacity(&self) -> u32 {
        u32::from(self.port_range_end) - u32::from(self.port_range_start) + 1
    }
}
