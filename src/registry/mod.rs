//! Backend registry: record types and the durable, concurrent store
//!
//! The registry is the only component that owns mutable shared state in the
//! control plane: the record map and the port counter. Everything else
//! holds `Arc` handles to it.

mod store;
mod types;

pub use store::ModelRegistry;
pub use types::{BackendKind, BackendRecord, CreateRequest, HealthStatus};
