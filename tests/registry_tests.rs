//! Registry Tests
//!
//! Tests for the durable backend registry: persistence round trips,
//! crash-tolerant loading, port allocation, and lookup semantics.

use modelforge::{BackendKind, BackendRecord, HealthStatus, ModelRegistry};
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tempfile::TempDir;

fn registry_path(dir: &TempDir) -> PathBuf {
    dir.path().join("registry.yml")
}

fn sample_record(id: &str, model_name: &str, port: u16) -> BackendRecord {
    BackendRecord {
        id: id.to_string(),
        model_name: model_name.to_string(),
        kind: BackendKind::Ollama,
        container_id: format!("{:064x}", port),
        endpoint: BackendKind::Ollama.endpoint_url(port),
        port,
        created_at: UNIX_EPOCH + Duration::from_secs(1_700_000_000),
        health: HealthStatus::Starting,
    }
}

#[tokio::test]
async fn missing_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ModelRegistry::open(registry_path(&dir), 11400, 11500);

    assert!(registry.list_all().await.is_empty());
}

#[tokio::test]
async fn corrupt_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = registry_path(&dir);
    std::fs::write(&path, "{{{ this is not yaml").unwrap();

    let registry = ModelRegistry::open(&path, 11400, 11500);

    assert!(registry.list_all().await.is_empty());
    // A corrupt file never blocks operation
    let port = registry.allocate_port().await.unwrap();
    assert_eq!(port, 11400);
}

#[tokio::test]
async fn save_then_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = registry_path(&dir);

    let first = sample_record("id-1", "mistral:7b", 11400);
    let second = sample_record("id-2", "phi-3", 11401);
    {
        let registry = ModelRegistry::open(&path, 11400, 11500);
        registry.register(first.clone()).await;
        registry.register(second.clone()).await;
    }

    let reloaded = ModelRegistry::open(&path, 11400, 11500);
    let mut entries = reloaded.list_all().await;
    entries.sort_by(|a, b| a.id.cmp(&b.id));

    assert_eq!(entries, vec![first, second]);
}

#[tokio::test]
async fn unregister_is_reflected_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = registry_path(&dir);

    {
        let registry = ModelRegistry::open(&path, 11400, 11500);
        registry.register(sample_record("id-1", "mistral:7b", 11400)).await;
        registry.register(sample_record("id-2", "phi-3", 11401)).await;
        registry.unregister("id-1").await;
    }

    let reloaded = ModelRegistry::open(&path, 11400, 11500);
    let entries = reloaded.list_all().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, "id-2");
}

#[tokio::test]
async fn unregister_unknown_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ModelRegistry::open(registry_path(&dir), 11400, 11500);
    registry.register(sample_record("id-1", "mistral:7b", 11400)).await;

    registry.unregister("no-such-id").await;

    assert_eq!(registry.list_all().await.len(), 1);
}

#[tokio::test]
async fn register_same_id_replaces_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ModelRegistry::open(registry_path(&dir), 11400, 11500);

    let mut record = sample_record("id-1", "mistral:7b", 11400);
    registry.register(record.clone()).await;
    record.health = HealthStatus::Healthy;
    registry.register(record.clone()).await;

    let entries = registry.list_all().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].health, HealthStatus::Healthy);
}

#[tokio::test]
async fn ports_are_issued_monotonically() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ModelRegistry::open(registry_path(&dir), 11400, 11500);

    assert_eq!(registry.allocate_port().await.unwrap(), 11400);
    assert_eq!(registry.allocate_port().await.unwrap(), 11401);
    assert_eq!(registry.allocate_port().await.unwrap(), 11402);
}

#[tokio::test]
async fn port_allocation_fails_past_range_end() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ModelRegistry::open(registry_path(&dir), 11400, 11401);

    assert!(registry.allocate_port().await.is_ok());
    assert!(registry.allocate_port().await.is_ok());

    let err = registry.allocate_port().await.unwrap_err();
    assert!(err.to_string().contains("exhausted"));
    assert_eq!(err.to_http_status(), 503);
}

#[tokio::test]
async fn released_ports_are_not_recycled() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ModelRegistry::open(registry_path(&dir), 11400, 11500);

    let first = registry.allocate_port().await.unwrap();
    registry.register(sample_record("id-1", "mistral:7b", first)).await;
    registry.release_port(first);
    registry.unregister("id-1").await;

    let second = registry.allocate_port().await.unwrap();
    assert_ne!(first, second);
    assert_eq!(second, first + 1);
}

#[tokio::test]
async fn reload_seeds_port_counter_past_highest_port() {
    let dir = tempfile::tempdir().unwrap();
    let path = registry_path(&dir);

    {
        let registry = ModelRegistry::open(&path, 11400, 11500);
        registry.register(sample_record("id-1", "mistral:7b", 11405)).await;
    }

    let reloaded = ModelRegistry::open(&path, 11400, 11500);
    assert_eq!(reloaded.allocate_port().await.unwrap(), 11406);
}

#[tokio::test]
async fn find_by_name_returns_first_registered_match() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ModelRegistry::open(registry_path(&dir), 11400, 11500);

    registry.register(sample_record("id-1", "mistral:7b", 11400)).await;
    registry.register(sample_record("id-2", "mistral:7b", 11401)).await;

    let found = registry.find_by_name("mistral:7b").await.unwrap();
    assert_eq!(found.id, "id-1");
    assert!(registry.find_by_name("no-such-model").await.is_none());
}

#[tokio::test]
async fn update_health_persists_only_on_change() {
    let dir = tempfile::tempdir().unwrap();
    let path = registry_path(&dir);
    let registry = ModelRegistry::open(&path, 11400, 11500);
    registry.register(sample_record("id-1", "mistral:7b", 11400)).await;

    assert!(!registry.update_health("id-1", HealthStatus::Starting).await);
    assert!(registry.update_health("id-1", HealthStatus::Healthy).await);
    assert!(!registry.update_health("id-1", HealthStatus::Healthy).await);
    assert!(!registry.update_health("no-such-id", HealthStatus::Healthy).await);

    // The transition reached disk
    let reloaded = ModelRegistry::open(&path, 11400, 11500);
    assert_eq!(
        reloaded.get("id-1").await.unwrap().health,
        HealthStatus::Healthy
    );
}

#[tokio::test]
async fn backup_sibling_holds_previous_generation() {
    let dir = tempfile::tempdir().unwrap();
    let path = registry_path(&dir);
    let registry = ModelRegistry::open(&path, 11400, 11500);

    registry.register(sample_record("id-1", "mistral:7b", 11400)).await;
    registry.register(sample_record("id-2", "phi-3", 11401)).await;

    let bak_path = dir.path().join("registry.yml.bak");
    assert!(bak_path.exists());

    // The backup is itself a loadable snapshot of the previous write
    let backup = ModelRegistry::open(&bak_path, 11400, 11500);
    assert_eq!(backup.list_all().await.len(), 1);
}

#[tokio::test]
async fn records_survive_with_created_at_intact() {
    let dir = tempfile::tempdir().unwrap();
    let path = registry_path(&dir);
    let created_at = UNIX_EPOCH + Duration::from_secs(1_700_000_000);

    {
        let registry = ModelRegistry::open(&path, 11400, 11500);
        let mut record = sample_record("id-1", "mistral:7b", 11400);
        record.created_at = created_at;
        registry.register(record).await;
    }

    let reloaded = ModelRegistry::open(&path, 11400, 11500);
    let record = reloaded.get("id-1").await.unwrap();
    assert_eq!(record.created_at, created_at);
    assert!(record.created_at <= SystemTime::now());
}
