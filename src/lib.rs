//! # Modelforge
//!
//! Control plane for dynamically managed LLM backend containers. A
//! declarative request ("run model X as backend type Y") becomes a running,
//! observable, and eventually removable container, with a durable record of
//! what is running so callers can route inference requests to a live
//! endpoint.
//!
//! ## Components
//!
//! - **Registry**: durable, concurrent store of backend records; sole
//!   issuer of host ports
//! - **Orchestrator**: fault-translating façade over the Docker Engine API
//! - **Manager**: atomic create/delete workflows with compensating rollback
//! - **Health Monitor**: background task reconciling registry health state
//!   against live container state
//!
//! ## Design Principles
//!
//! - **Single Writer**: all registry mutations are serialized; readers see
//!   point-in-time copies
//! - **Fail Fast**: engine connectivity is verified once at startup and is
//!   fatal if absent
//! - **Crash Safe**: every registry mutation snapshots to disk via
//!   write-temp-then-rename, with the previous generation kept as `.bak`
//! - **No Partial State**: a backend either completes its create pipeline
//!   and is registered, or leaves nothing behind
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use clap::Parser;
//! use modelforge::ForgeCliOptions;
//!
//! #[tokio::main]
//! async fn main() -> modelforge::Result<()> {
//!     ForgeCliOptions::parse().run().await
//! }
//! ```

pub mod cli_options;
pub mod config;
pub mod error;
pub mod manager;
pub mod monitor;
pub mod orchestrator;
pub mod registry;
pub mod server;

pub mod test_utils;

// Re-export commonly used types for convenience
pub use cli_options::{ForgeCliOptions, LoggingOptions};
pub use config::ControlPlaneConfig;
pub use error::{ForgeError, Result};
pub use manager::ModelManager;
pub use monitor::{HealthMonitor, HealthMonitorHandle, SweepSummary};
pub use orchestrator::{ContainerEngine, DockerOrchestrator};
pub use registry::{BackendKind, BackendRecord, CreateRequest, HealthStatus, ModelRegistry};
pub use server::ControlApiServer;
