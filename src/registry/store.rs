//! Durable, concurrent backend registry
//!
//! The registry is the single source of truth for which backends exist and
//! the sole issuer of host ports. Mutations are serialized behind a write
//! lock and every mutation triggers a full-state YAML snapshot written with
//! a write-temp-then-rename protocol; readers get cloned point-in-time
//! copies and never block on I/O.
//!
//! Snapshot failures are logged and swallowed — the in-memory state stays
//! authoritative and a failed load at startup degrades to an empty registry
//! rather than refusing to start.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::types::{BackendRecord, HealthStatus};
use crate::error::{ForgeError, Result};

/// On-disk shape of the registry snapshot
#[derive(Debug, Serialize, Deserialize)]
struct RegistrySnapshot {
    entries: Vec<BackendRecord>,
}

/// Writer-serialized interior state
///
/// `order` tracks registration order so listings and first-match lookups
/// are deterministic within a process run. `next_port` is monotonic; ports
/// are never returned to the pool.
struct RegistryInner {
    records: HashMap<String, BackendRecord>,
    order: Vec<String>,
    next_port: u32,
}

impl RegistryInner {
    fn ordered_records(&self) -> Vec<BackendRecord> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id).cloned())
            .collect()
    }
}

/// Durable registry of running backends
///
/// All mutations go through `&self` async methods that take the write lock,
/// so two create/delete workflows racing on registration or port allocation
/// are serialized here. Reads clone the current state and may observe
/// either the pre- or post-mutation view of any single operation, never a
/// partial one.
///
/// # Examples
///
/// ```rust
/// use modelforge::registry::ModelRegistry;
///
/// # async fn example() {
/// let registry = ModelRegistry::open("./data/registry.yml", 11400, 11500);
/// let port = registry.allocate_port().await.unwrap();
/// assert!(port >= 11400);
/// # }
/// ```
pub struct ModelRegistry {
    file_path: PathBuf,
    port_start: u16,
    port_end: u16,
    inner: RwLock<RegistryInner>,
}

impl ModelRegistry {
    /// Opens the registry, loading the snapshot file if one exists
    ///
    /// A missing file means "start empty"; an unreadable or unparsable file
    /// is logged and also starts empty — a failed load never blocks
    /// startup. The port counter is seeded to one past the highest port
    /// found in the snapshot, clamped to the range start.
    pub fn open(file_path: impl Into<PathBuf>, port_start: u16, port_end: u16) -> Self {
        let file_path = file_path.into();

        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = fs::create_dir_all(parent) {
                    warn!(
                        path = %parent.display(),
                        error = %e,
                        "failed to create registry data directory"
                    );
                }
            }
        }

        let entries = load_snapshot(&file_path);
        let max_port = entries.iter().map(|r| u32::from(r.port)).max();
        let next_port = match max_port {
            Some(max) => (max + 1).max(u32::from(port_start)),
            None => u32::from(port_start),
        };

        let mut records = HashMap::with_capacity(entries.len());
        let mut order = Vec::with_capacity(entries.len());
        for record in entries {
            order.push(record.id.clone());
            records.insert(record.id.clone(), record);
        }

        info!(
            path = %file_path.display(),
            entries = records.len(),
            port_range = %format!("{}-{}", port_start, port_end),
            next_port,
            "model registry initialized"
        );

        Self {
            file_path,
            port_start,
            port_end,
            inner: RwLock::new(RegistryInner {
                records,
                order,
                next_port,
            }),
        }
    }

    /// Registers (or replaces) a backend record
    ///
    /// Idempotent: re-registering an id overwrites the stored record in
    /// place without changing its position in registration order. Triggers
    /// a snapshot write.
    pub async fn register(&self, record: BackendRecord) {
        let mut inner = self.inner.write().await;
        info!(
            id = %record.id,
            model = %record.model_name,
            port = record.port,
            "registered model backend"
        );
        if !inner.records.contains_key(&record.id) {
            inner.order.push(record.id.clone());
        }
        inner.records.insert(record.id.clone(), record);
        self.persist(&inner);
    }

    /// Removes a backend record
    ///
    /// Unregistering an unknown id is logged, not an error. Triggers a
    /// snapshot write when a record was actually removed.
    pub async fn unregister(&self, id: &str) {
        let mut inner = self.inner.write().await;
        match inner.records.remove(id) {
            Some(removed) => {
                inner.order.retain(|existing| existing != id);
                info!(
                    id = %id,
                    model = %removed.model_name,
                    "unregistered model backend"
                );
                self.persist(&inner);
            }
            None => {
                warn!(id = %id, "attempted to unregister unknown backend");
            }
        }
    }

    /// Updates the health field of a record, persisting only on change
    ///
    /// This is the single mutation path for the health field outside of
    /// record creation and removal. Returns `true` when a transition was
    /// recorded.
    pub async fn update_health(&self, id: &str, health: HealthStatus) -> bool {
        let mut inner = self.inner.write().await;
        let Some(record) = inner.records.get_mut(id) else {
            debug!(id = %id, "health update for unknown backend ignored");
            return false;
        };
        if record.health == health {
            return false;
        }
        let previous = record.health;
        record.health = health;
        info!(
            id = %id,
            model = %record.model_name,
            container = %record.short_container_id(),
            previous = %previous,
            current = %health,
            "backend health transition"
        );
        self.persist(&inner);
        true
    }

    /// Returns a copy of the record for `id`, if registered
    pub async fn get(&self, id: &str) -> Option<BackendRecord> {
        self.inner.read().await.records.get(id).cloned()
    }

    /// Returns a point-in-time copy of all records in registration order
    pub async fn list_all(&self) -> Vec<BackendRecord> {
        self.inner.read().await.ordered_records()
    }

    /// Returns the first record whose model name matches, in registration
    /// order
    ///
    /// Registration order is not guaranteed across restarts.
    pub async fn find_by_name(&self, model_name: &str) -> Option<BackendRecord> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id))
            .find(|record| record.model_name == model_name)
            .cloned()
    }

    /// Allocates the next unused port from the configured range
    ///
    /// Ports are issued monotonically and never recycled within a process
    /// run; the allocator fails once the range's upper bound is passed.
    pub async fn allocate_port(&self) -> Result<u16> {
        let mut inner = self.inner.write().await;
        let port = inner.next_port;
        if port > u32::from(self.port_end) {
            return Err(ForgeError::port_range_exhausted(
                self.port_start,
                self.port_end,
            ));
        }
        inner.next_port += 1;
        debug!(port, "allocated port");
        Ok(port as u16)
    }

    /// Records the intent to release a port
    ///
    /// Ports are not recycled in the current implementation; this only logs
    /// the intent so the allocation trail is visible.
    pub fn release_port(&self, port: u16) {
        debug!(port, "port released (not recycled)");
    }

    /// Serializes the full state and writes it with the crash-safe protocol
    ///
    /// Called under the write lock so snapshot generations match the
    /// mutation order. Failures are logged and swallowed; memory stays
    /// authoritative.
    fn persist(&self, inner: &RegistryInner) {
        let snapshot = RegistrySnapshot {
            entries: inner.ordered_records(),
        };
        if let Err(e) = write_snapshot(&self.file_path, &snapshot) {
            error!(
                path = %self.file_path.display(),
                error = %e,
                "failed to save registry snapshot"
            );
        } else {
            debug!(
                path = %self.file_path.display(),
                entries = snapshot.entries.len(),
                "registry snapshot saved"
            );
        }
    }
}

/// Appends a suffix to a path without touching its extension
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

/// Crash-safe snapshot write: temp file in the same directory, previous
/// file copied to a `.bak` sibling, atomic rename over the target
fn write_snapshot(path: &Path, snapshot: &RegistrySnapshot) -> std::io::Result<()> {
    let yaml = serde_yaml::to_string(snapshot)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let tmp_path = sibling(path, ".tmp");
    fs::write(&tmp_path, yaml)?;

    if path.exists() {
        fs::copy(path, sibling(path, ".bak"))?;
    }

    fs::rename(&tmp_path, path)
}

/// Loads snapshot entries, degrading to empty on any failure
fn load_snapshot(path: &Path) -> Vec<BackendRecord> {
    if !path.exists() {
        info!(
            path = %path.display(),
            "registry file not found, starting with empty registry"
        );
        return Vec::new();
    }

    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            error!(
                path = %path.display(),
                error = %e,
                "failed to read registry file, starting with empty registry"
            );
            return Vec::new();
        }
    };

    match serde_yaml::from_str::<RegistrySnapshot>(&contents) {
        Ok(snapshot) => snapshot.entries,
        Err(e) => {
            error!(
                path = %path.display(),
                error = %e,
                "failed to parse registry file, starting with empty registry"
            );
            Vec::new()
        }
    }
}
