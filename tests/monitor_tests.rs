//! Health Monitor Tests
//!
//! Tests for the background reconciliation sweep: state transitions,
//! change-only persistence, error pessimism, and graceful shutdown.

use modelforge::test_utils::MockEngine;
use modelforge::{
    BackendKind, ContainerEngine, CreateRequest, HealthMonitor, HealthStatus, ModelManager,
    ModelRegistry,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    path: PathBuf,
    registry: Arc<ModelRegistry>,
    engine: Arc<MockEngine>,
    manager: ModelManager,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.yml");
    let registry = Arc::new(ModelRegistry::open(&path, 11400, 11500));
    let engine = Arc::new(MockEngine::new());
    let manager = ModelManager::new(
        Arc::clone(&registry),
        Arc::clone(&engine) as Arc<dyn ContainerEngine>,
    );
    Harness {
        _dir: dir,
        path,
        registry,
        engine,
        manager,
    }
}

impl Harness {
    fn monitor(&self, interval: Duration, initial_delay: Duration) -> HealthMonitor {
        HealthMonitor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.engine) as Arc<dyn ContainerEngine>,
            interval,
            initial_delay,
        )
    }

    async fn create(&self, model_name: &str) -> modelforge::BackendRecord {
        self.manager
            .create_backend(CreateRequest {
                model_name: model_name.to_string(),
                kind: BackendKind::Ollama,
                custom_image: None,
                env: HashMap::new(),
            })
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn sweep_of_empty_registry_is_a_noop() {
    let h = harness();
    let monitor = h.monitor(Duration::from_secs(30), Duration::from_secs(10));

    let summary = monitor.sweep_once().await;

    assert_eq!(summary.checked, 0);
    assert_eq!(summary.transitions, 0);
}

#[tokio::test]
async fn sweep_promotes_running_starting_backend_to_healthy() {
    let h = harness();
    let record = h.create("mistral:7b").await;
    assert_eq!(record.health, HealthStatus::Starting);

    let monitor = h.monitor(Duration::from_secs(30), Duration::from_secs(10));
    let summary = monitor.sweep_once().await;

    assert_eq!(summary.checked, 1);
    assert_eq!(summary.healthy, 1);
    assert_eq!(summary.transitions, 1);
    assert_eq!(
        h.registry.get(&record.id).await.unwrap().health,
        HealthStatus::Healthy
    );
}

#[tokio::test]
async fn sweep_marks_not_running_backend_unhealthy_exactly_once() {
    let h = harness();
    let record = h.create("mistral:7b").await;
    h.engine.set_running(&record.container_id, false);

    let monitor = h.monitor(Duration::from_secs(30), Duration::from_secs(10));

    let first = monitor.sweep_once().await;
    assert_eq!(first.unhealthy, 1);
    assert_eq!(first.transitions, 1);

    // The transition reached the snapshot file
    let reloaded = ModelRegistry::open(&h.path, 11400, 11500);
    assert_eq!(
        reloaded.get(&record.id).await.unwrap().health,
        HealthStatus::Unhealthy
    );

    // A repeated sweep with no change triggers no additional write
    let second = monitor.sweep_once().await;
    assert_eq!(second.unhealthy, 1);
    assert_eq!(second.transitions, 0);
}

#[tokio::test]
async fn sweep_flaps_between_healthy_and_unhealthy() {
    let h = harness();
    let record = h.create("mistral:7b").await;
    let monitor = h.monitor(Duration::from_secs(30), Duration::from_secs(10));

    assert_eq!(monitor.sweep_once().await.transitions, 1);
    assert_eq!(
        h.registry.get(&record.id).await.unwrap().health,
        HealthStatus::Healthy
    );

    h.engine.set_running(&record.container_id, false);
    assert_eq!(monitor.sweep_once().await.transitions, 1);
    assert_eq!(
        h.registry.get(&record.id).await.unwrap().health,
        HealthStatus::Unhealthy
    );

    h.engine.set_running(&record.container_id, true);
    assert_eq!(monitor.sweep_once().await.transitions, 1);
    assert_eq!(
        h.registry.get(&record.id).await.unwrap().health,
        HealthStatus::Healthy
    );
}

#[tokio::test]
async fn engine_query_errors_read_as_unhealthy() {
    let h = harness();
    let record = h.create("mistral:7b").await;
    h.engine.fail_on("is_running");

    let monitor = h.monitor(Duration::from_secs(30), Duration::from_secs(10));
    let summary = monitor.sweep_once().await;

    assert_eq!(summary.unhealthy, 1);
    assert_eq!(
        h.registry.get(&record.id).await.unwrap().health,
        HealthStatus::Unhealthy
    );
}

#[tokio::test]
async fn sweep_never_removes_records() {
    let h = harness();
    h.create("m1").await;
    h.create("m2").await;
    h.engine.fail_on("is_running");

    let monitor = h.monitor(Duration::from_secs(30), Duration::from_secs(10));
    monitor.sweep_once().await;

    assert_eq!(h.registry.list_all().await.len(), 2);
}

#[tokio::test]
async fn spawned_monitor_sweeps_and_shuts_down_gracefully() {
    let h = harness();
    let record = h.create("mistral:7b").await;

    let handle = h
        .monitor(Duration::from_millis(20), Duration::from_millis(0))
        .spawn();

    // Give the loop a few ticks to reconcile
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        h.registry.get(&record.id).await.unwrap().health,
        HealthStatus::Healthy
    );

    handle.shutdown().await;

    // No further sweeps happen after shutdown
    let swept_before = h.engine.op_count("is_running");
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(h.engine.op_count("is_running"), swept_before);
}

#[tokio::test]
async fn end_to_end_create_sweep_delete() {
    let h = harness();
    let monitor = h.monitor(Duration::from_secs(30), Duration::from_secs(10));

    // create(modelName="m1", kind=ollama) -> starting record with a port in range
    let record = h.create("m1").await;
    assert_eq!(record.health, HealthStatus::Starting);
    assert!((11400..=11500).contains(&record.port));

    // one sweep with the engine reporting "running" -> healthy
    monitor.sweep_once().await;
    assert_eq!(
        h.registry.get(&record.id).await.unwrap().health,
        HealthStatus::Healthy
    );

    // delete -> record gone from listings and lookups
    h.manager.delete_backend(&record.id).await.unwrap();
    assert!(h.registry.list_all().await.is_empty());
    assert!(h.registry.get(&record.id).await.is_none());
}
