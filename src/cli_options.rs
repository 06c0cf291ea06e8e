//! CLI options for the Modelforge control plane
//!
//! Defines the command-line interface, converts it into a validated
//! [`ControlPlaneConfig`], and wires the subsystems together in `run()`.

use clap::{Args, Parser};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::ControlPlaneConfig;
use crate::error::{ForgeError, Result};
use crate::manager::ModelManager;
use crate::monitor::HealthMonitor;
use crate::orchestrator::{ContainerEngine, DockerOrchestrator};
use crate::registry::ModelRegistry;
use crate::server::ControlApiServer;

/// Common logging options
#[derive(Args, Debug, Clone)]
pub struct LoggingOptions {
    /// Logging level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", env = "MODELFORGE_LOG_LEVEL")]
    pub log_level: String,
}

impl LoggingOptions {
    /// Initialize logging with the configured level
    pub fn init_logging(&self) {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(self.parse_log_level())
            .with_target(true)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set logging subscriber");
    }

    /// Parse the log level string into a tracing Level
    pub fn parse_log_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "error" => Level::ERROR,
            "warn" => Level::WARN,
            "info" => Level::INFO,
            "debug" => Level::DEBUG,
            "trace" => Level::TRACE,
            _ => Level::INFO,
        }
    }
}

/// Modelforge - control plane for dynamic LLM backend containers
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct ForgeCliOptions {
    /// Address to serve the control API on
    #[arg(
        short,
        long,
        default_value = "127.0.0.1:8080",
        env = "MODELFORGE_LISTEN_ADDR"
    )]
    pub listen_addr: SocketAddr,

    /// Container engine address (unix:// socket or tcp:// address)
    #[arg(
        long,
        default_value = "unix:///var/run/docker.sock",
        env = "MODELFORGE_DOCKER_HOST"
    )]
    pub docker_host: String,

    /// Image pull timeout in seconds
    #[arg(long, default_value_t = 300, env = "MODELFORGE_IMAGE_PULL_TIMEOUT_SECS")]
    pub image_pull_timeout_secs: u64,

    /// First host port handed to backends
    #[arg(long, default_value_t = 11400, env = "MODELFORGE_PORT_RANGE_START")]
    pub port_range_start: u16,

    /// Last host port handed to backends (inclusive)
    #[arg(long, default_value_t = 11500, env = "MODELFORGE_PORT_RANGE_END")]
    pub port_range_end: u16,

    /// Enable the background health sweep
    #[arg(long, default_value_t = true, env = "MODELFORGE_HEALTH_CHECK_ENABLED")]
    pub health_check_enabled: bool,

    /// Seconds between health sweeps
    #[arg(
        long,
        default_value_t = 30,
        env = "MODELFORGE_HEALTH_CHECK_INTERVAL_SECS"
    )]
    pub health_check_interval_secs: u64,

    /// Seconds before the first health sweep
    #[arg(
        long,
        default_value_t = 10,
        env = "MODELFORGE_HEALTH_CHECK_INITIAL_DELAY_SECS"
    )]
    pub health_check_initial_delay_secs: u64,

    /// Registry snapshot file path
    #[arg(
        long,
        default_value = "./data/registry.yml",
        env = "MODELFORGE_REGISTRY_FILE"
    )]
    pub registry_file: PathBuf,

    #[command(flatten)]
    pub logging: LoggingOptions,
}

impl ForgeCliOptions {
    /// Run the control plane with the configured options
    ///
    /// Construction order matters: the registry loads its snapshot first,
    /// the engine connection is verified (fatal on failure), and only then
    /// are the manager, monitor, and API server brought up.
    pub async fn run(self) -> Result<()> {
        self.logging.init_logging();

        info!("Starting Modelforge control plane");

        let config = self.to_config();
        config.validate()?;

        info!(
            listen_addr = %config.listen_addr,
            docker_host = %config.docker_host,
            registry_file = %config.registry_file.display(),
            port_range = %format!("{}-{}", config.port_range_start, config.port_range_end),
            "control plane starting"
        );

        let registry = Arc::new(ModelRegistry::open(
            &config.registry_file,
            config.port_range_start,
            config.port_range_end,
        ));

        let engine: Arc<dyn ContainerEngine> = Arc::new(
            DockerOrchestrator::connect(&config.docker_host, config.image_pull_timeout).await?,
        );

        let manager = Arc::new(ModelManager::new(
            Arc::clone(&registry),
            Arc::clone(&engine),
        ));

        let monitor = if config.health_check_enabled {
            Some(
                HealthMonitor::new(
                    Arc::clone(&registry),
                    Arc::clone(&engine),
                    config.health_check_interval,
                    config.health_check_initial_delay,
                )
                .spawn(),
            )
        } else {
            info!("background health checking is disabled");
            None
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let server = ControlApiServer::new(Arc::clone(&manager), config.listen_addr);
        let server_task = tokio::spawn(server.serve(shutdown_rx));

        tokio::signal::ctrl_c().await.map_err(|e| {
            ForgeError::internal("failed to listen for shutdown signal", Some(Box::new(e)))
        })?;

        info!("shutdown signal received, stopping control plane");

        if let Some(monitor) = monitor {
            monitor.shutdown().await;
        }
        let _ = shutdown_tx.send(());

        match server_task.await {
            Ok(result) => result,
            Err(e) => Err(ForgeError::internal(
                "control API task did not shut down cleanly",
                Some(Box::new(e)),
            )),
        }
    }

    /// Convert CLI options to a ControlPlaneConfig
    pub fn to_config(&self) -> ControlPlaneConfig {
        ControlPlaneConfig {
            listen_addr: self.listen_addr,
            docker_host: self.docker_host.clone(),
            image_pull_timeout: Duration::from_secs(self.image_pull_timeout_secs),
            port_range_start: self.port_range_start,
            port_range_end: self.port_range_end,
            health_check_enabled: self.health_check_enabled,
            health_check_interval: Duration::from_secs(self.health_check_interval_secs),
            health_check_initial_delay: Duration::from_secs(self.health_check_initial_delay_secs),
            registry_file: self.registry_file.clone(),
            log_level: self.logging.log_level.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_log_level_handles_known_levels() {
        let opts = LoggingOptions {
            log_level: "debug".to_string(),
        };
        assert_eq!(opts.parse_log_level(), Level::DEBUG);

        let opts = LoggingOptions {
            log_level: "bogus".to_string(),
        };
        assert_eq!(opts.parse_log_level(), Level::INFO);
    }

    #[test]
    fn cli_defaults_convert_to_valid_config() {
        let opts = ForgeCliOptions::parse_from(["modelforge"]);
        let config = opts.to_config();
        assert!(config.validate().is_ok());
        assert_eq!(config, ControlPlaneConfig::default());
    }
}
