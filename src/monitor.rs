//! Background health reconciliation
//!
//! A single long-lived task sweeps every registered backend on a fixed
//! cadence, asks the engine whether its container is running, and writes
//! the result back to the registry only when the stored status differs.
//! Sweeps never overlap: the task awaits each sweep before the next tick,
//! and a late sweep defers the following one rather than compounding.
//!
//! The monitor never removes records, never touches ports, and never
//! assigns the terminal `stopped` state — that belongs to the delete
//! workflow alone.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::orchestrator::ContainerEngine;
use crate::registry::{HealthStatus, ModelRegistry};

/// Outcome of one reconciliation sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepSummary {
    /// Number of records examined
    pub checked: usize,
    /// Records whose container was reported running
    pub healthy: usize,
    /// Records whose container was not running, missing, or unqueryable
    pub unhealthy: usize,
    /// Records whose stored status changed and was persisted
    pub transitions: usize,
}

/// Periodic health monitor for registered backends
pub struct HealthMonitor {
    registry: Arc<ModelRegistry>,
    engine: Arc<dyn ContainerEngine>,
    interval: Duration,
    initial_delay: Duration,
}

impl HealthMonitor {
    /// Creates a monitor over the given registry and engine
    pub fn new(
        registry: Arc<ModelRegistry>,
        engine: Arc<dyn ContainerEngine>,
        interval: Duration,
        initial_delay: Duration,
    ) -> Self {
        Self {
            registry,
            engine,
            interval,
            initial_delay,
        }
    }

    /// Runs one reconciliation sweep over all registered backends
    ///
    /// An engine query that errors is treated identically to "not running":
    /// optimistic liveness, pessimistic on any doubt. Transitions are
    /// logged and persisted by the registry's health-update path; an
    /// unchanged status triggers no write.
    pub async fn sweep_once(&self) -> SweepSummary {
        let records = self.registry.list_all().await;
        let mut summary = SweepSummary::default();

        if records.is_empty() {
            debug!("no backends registered, skipping health sweep");
            return summary;
        }

        debug!(count = records.len(), "running health sweep");

        for record in records {
            let running = self.engine.is_running(&record.container_id).await;
            let current = if running {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            };

            summary.checked += 1;
            if running {
                summary.healthy += 1;
            } else {
                summary.unhealthy += 1;
            }

            if record.health != current
                && self.registry.update_health(&record.id, current).await
            {
                summary.transitions += 1;
            }
        }

        debug!(
            healthy = summary.healthy,
            unhealthy = summary.unhealthy,
            transitions = summary.transitions,
            "health sweep complete"
        );
        summary
    }

    /// Spawns the sweep loop and returns a handle for graceful shutdown
    ///
    /// The first sweep runs after the configured initial delay; subsequent
    /// sweeps follow the configured interval with deferred (never
    /// concurrent) catch-up.
    pub fn spawn(self) -> HealthMonitorHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            info!(
                interval_secs = self.interval.as_secs(),
                initial_delay_secs = self.initial_delay.as_secs(),
                "health monitor started"
            );

            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("health monitor stopped before first sweep");
                    return;
                }
                _ = tokio::time::sleep(self.initial_delay) => {}
            }

            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        self.sweep_once().await;
                    }
                }
            }

            info!("health monitor stopped");
        });

        HealthMonitorHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to a spawned [`HealthMonitor`]
///
/// Dropping the handle without calling [`shutdown`](Self::shutdown) leaves
/// the task running until the process exits.
pub struct HealthMonitorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl HealthMonitorHandle {
    /// Signals the monitor to stop and waits for the task to drain
    ///
    /// An in-flight sweep finishes before the task exits.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "health monitor task did not shut down cleanly");
        }
    }
}
