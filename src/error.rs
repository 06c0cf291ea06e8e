//! # Error Handling Module
//!
//! Error types for the Modelforge control plane with proper failure
//! classification and context preservation.
//!
//! ## Error Categories
//!
//! - **Orchestration Errors**: container engine failures (unreachable daemon,
//!   pull errors, create/start/stop/remove failures)
//! - **Capacity Errors**: port pool exhaustion
//! - **Lookup Errors**: operations referencing unknown backend ids
//! - **Workflow Errors**: create/delete pipelines that failed part-way
//! - **Validation/Configuration Errors**: rejected requests and bad config
//!
//! Engine-level errors are never exposed raw to workflow callers; they are
//! wrapped with the attempted operation and its target so a failure can be
//! diagnosed without engine-specific knowledge.

use thiserror::Error;
use tracing::warn;

/// Result type alias for Modelforge operations
///
/// This is the standard Result type used throughout the crate. It provides
/// a consistent interface for error handling and makes error propagation
/// more ergonomic.
pub type Result<T> = std::result::Result<T, ForgeError>;

/// Boxed error source carried through the error chain
type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Error types for control-plane operations
///
/// Each variant includes enough context (operation, target id or handle) to
/// diagnose the failure from logs alone. Workflow-level variants
/// ([`ForgeError::Creation`], [`ForgeError::Deletion`]) wrap the first
/// lower-level failure as their `source`.
#[derive(Error, Debug)]
pub enum ForgeError {
    /// A container engine call failed
    ///
    /// Covers unreachable daemons, image pull errors and timeouts, and
    /// create/start/stop/remove failures. The `operation` names the engine
    /// call that was attempted; `target` is the image reference, container
    /// name, or container id it was attempted against.
    #[error("orchestration failure during {operation} on {target}: {message}")]
    Orchestration {
        /// Engine operation that was attempted (e.g. "pull-image")
        operation: String,
        /// Image reference, container name, or container id
        target: String,
        /// Human-readable failure description
        message: String,
        /// Underlying engine error, when one exists
        #[source]
        source: Option<BoxedSource>,
    },

    /// The port allocator has no capacity left
    ///
    /// Raised once the monotonic counter passes the configured upper bound.
    /// Ports are not recycled within a process run, so sustained
    /// create/delete churn will eventually exhaust the range.
    #[error("port pool exhausted: range {start}-{end} is fully allocated")]
    PortRangeExhausted {
        /// First port of the configured range
        start: u16,
        /// Last port of the configured range (inclusive)
        end: u16,
    },

    /// An operation referenced an unknown backend id
    #[error("backend not found: {id}")]
    NotFound {
        /// The id that was looked up
        id: String,
    },

    /// The create workflow failed
    ///
    /// Wraps the first lower-level failure. `cleanup_completed` records
    /// whether the compensating rollback (container stop+remove, port
    /// release) succeeded; a `false` here means a container may have been
    /// left behind and warrants operator attention.
    #[error("failed to create backend for model {model}: {message}")]
    Creation {
        /// Model name from the original request
        model: String,
        /// Description of the step that failed
        message: String,
        /// Whether compensating cleanup succeeded
        cleanup_completed: bool,
        /// The lower-level failure that aborted the pipeline
        #[source]
        source: Option<BoxedSource>,
    },

    /// The delete workflow failed
    ///
    /// The registry entry is left intact when this is raised: the record
    /// still points at a container whose removal is unconfirmed, and a
    /// retried delete is the recovery path.
    #[error("failed to delete backend {id}: {message}")]
    Deletion {
        /// Backend id the delete was issued against
        id: String,
        /// Description of the step that failed
        message: String,
        /// The orchestration failure that aborted the workflow
        #[source]
        source: Option<BoxedSource>,
    },

    /// An inbound request failed validation
    #[error("invalid request: {reason}")]
    Validation {
        /// Reason the request was rejected
        reason: String,
    },

    /// Configuration validation failed
    ///
    /// Raised during startup; the process should not come up with a
    /// configuration that fails these checks.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem
        message: String,
    },

    /// Unexpected internal failure
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal failure
        message: String,
        /// Source error for debugging
        #[source]
        source: Option<BoxedSource>,
    },
}

impl ForgeError {
    /// Creates an orchestration error with operation and target context
    pub fn orchestration(
        operation: impl Into<String>,
        target: impl Into<String>,
        message: impl Into<String>,
        source: Option<BoxedSource>,
    ) -> Self {
        Self::Orchestration {
            operation: operation.into(),
            target: target.into(),
            message: message.into(),
            source,
        }
    }

    /// Creates a port exhaustion error for the configured range
    pub fn port_range_exhausted(start: u16, end: u16) -> Self {
        Self::PortRangeExhausted { start, end }
    }

    /// Creates a not-found error for a backend id
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Wraps a lower-level failure as a create-workflow error
    ///
    /// # Arguments
    ///
    /// * `model` - Model name from the original request
    /// * `cleanup_completed` - Whether compensating cleanup succeeded
    /// * `cause` - The failure that aborted the pipeline
    pub fn creation(model: impl Into<String>, cleanup_completed: bool, cause: ForgeError) -> Self {
        Self::Creation {
            model: model.into(),
            message: cause.to_string(),
            cleanup_completed,
            source: Some(Box::new(cause)),
        }
    }

    /// Wraps an orchestration failure as a delete-workflow error
    pub fn deletion(id: impl Into<String>, cause: ForgeError) -> Self {
        Self::Deletion {
            id: id.into(),
            message: cause.to_string(),
            source: Some(Box::new(cause)),
        }
    }

    /// Creates a request validation error
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an internal error with source context
    pub fn internal(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::Internal {
            message: message.into(),
            source,
        }
    }

    /// Maps this error to the HTTP status code the control API returns
    ///
    /// # Status Code Mapping
    ///
    /// - Orchestration errors: 502 Bad Gateway (the engine is the upstream)
    /// - Port exhaustion: 503 Service Unavailable
    /// - Not found: 404 Not Found
    /// - Creation/deletion workflow errors: 500 Internal Server Error
    /// - Validation errors: 400 Bad Request
    /// - Configuration/internal errors: 500 Internal Server Error
    pub fn to_http_status(&self) -> u16 {
        match self {
            ForgeError::Orchestration { .. } => 502,
            ForgeError::PortRangeExhausted { .. } => 503,
            ForgeError::NotFound { .. } => 404,
            ForgeError::Creation { .. } => 500,
            ForgeError::Deletion { .. } => 500,
            ForgeError::Validation { .. } => 400,
            ForgeError::Configuration { .. } => {
                // Configuration errors should have stopped startup
                warn!("configuration error reached HTTP status mapping");
                500
            }
            ForgeError::Internal { .. } => 500,
        }
    }

    /// Checks whether the operation that produced this error can be retried
    ///
    /// Orchestration failures and port exhaustion may clear up (the engine
    /// recovers, the operator widens the range); validation and lookup
    /// failures will fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        match self {
            ForgeError::Orchestration { .. } => true,
            ForgeError::PortRangeExhausted { .. } => true,
            ForgeError::NotFound { .. } => false,
            ForgeError::Creation { .. } => true,
            ForgeError::Deletion { .. } => true,
            ForgeError::Validation { .. } => false,
            ForgeError::Configuration { .. } => false,
            ForgeError::Internal { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_wraps_cause_message() {
        let cause = ForgeError::orchestration("start-container", "abc123", "engine said no", None);
        let err = ForgeError::creation("mistral:7b", true, cause);

        let text = err.to_string();
        assert!(text.contains("mistral:7b"));
        assert!(text.contains("start-container"));
        assert_eq!(err.to_http_status(), 500);
    }

    #[test]
    fn status_mapping_covers_lookup_and_capacity() {
        assert_eq!(ForgeError::not_found("nope").to_http_status(), 404);
        assert_eq!(ForgeError::port_range_exhausted(11400, 11500).to_http_status(), 503);
        assert_eq!(ForgeError::validation("blank name").to_http_status(), 400);
    }

    #[test]
    fn retryability_classification() {
        assert!(ForgeError::orchestration("pull-image", "img", "timeout", None).is_retryable());
        assert!(!ForgeError::not_found("gone").is_retryable());
        assert!(!ForgeError::validation("bad").is_retryable());
    }
}
