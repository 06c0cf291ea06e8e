//! Core data types for the backend registry
//!
//! This module contains the record types persisted in the registry and the
//! closed set of supported backend kinds with their fixed image/port table.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::SystemTime;

use crate::error::{ForgeError, Result};

/// Serde module for SystemTime serialization as epoch seconds
mod system_time_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let duration = time
            .duration_since(UNIX_EPOCH)
            .map_err(serde::ser::Error::custom)?;
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::from_secs(secs))
    }
}

/// Supported backend container kinds
///
/// Two well-known kinds carry a fixed image and container-internal port;
/// the custom kind takes a caller-supplied image.
///
/// # Serialization
///
/// Serialized as lowercase strings in JSON/YAML.
///
/// # Examples
///
/// ```rust
/// use modelforge::registry::BackendKind;
///
/// let kind = BackendKind::Ollama;
/// assert_eq!(serde_json::to_string(&kind).unwrap(), "\"ollama\"");
/// assert_eq!(kind.container_port(), 11434);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Standard Ollama server
    ///
    /// Image `ollama/ollama:latest`, internal port 11434, generate endpoint
    /// at `/api/generate`.
    Ollama,

    /// llama.cpp GGUF inference server
    ///
    /// Image `ghcr.io/ggerganov/llama.cpp:server`, internal port 8080,
    /// completion endpoint at `/completion`.
    LlamaCpp,

    /// User-provided container image
    ///
    /// The image reference comes from the create request; the container is
    /// assumed to listen on 8080 and define its own endpoint paths.
    Custom,
}

impl BackendKind {
    /// Returns the fixed image reference for well-known kinds
    ///
    /// Returns `None` for [`BackendKind::Custom`], whose image must come
    /// from the request.
    pub fn default_image(&self) -> Option<&'static str> {
        match self {
            BackendKind::Ollama => Some("ollama/ollama:latest"),
            BackendKind::LlamaCpp => Some("ghcr.io/ggerganov/llama.cpp:server"),
            BackendKind::Custom => None,
        }
    }

    /// Resolves the image reference to run for this kind
    ///
    /// Well-known kinds ignore `custom_image` and use their fixed image.
    /// The custom kind requires a non-blank `custom_image`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use modelforge::registry::BackendKind;
    ///
    /// let image = BackendKind::Ollama.resolve_image(None).unwrap();
    /// assert_eq!(image, "ollama/ollama:latest");
    ///
    /// assert!(BackendKind::Custom.resolve_image(Some("  ")).is_err());
    /// ```
    pub fn resolve_image(&self, custom_image: Option<&str>) -> Result<String> {
        match self.default_image() {
            Some(image) => Ok(image.to_string()),
            None => match custom_image {
                Some(image) if !image.trim().is_empty() => Ok(image.to_string()),
                _ => Err(ForgeError::validation(
                    "custom image name is required for the custom backend kind",
                )),
            },
        }
    }

    /// Returns the container-internal port this kind listens on
    pub fn container_port(&self) -> u16 {
        match self {
            BackendKind::Ollama => 11434,
            BackendKind::LlamaCpp => 8080,
            BackendKind::Custom => 8080,
        }
    }

    /// Returns the well-known path suffix appended to the endpoint URL
    ///
    /// Custom backends define their own paths, so their suffix is empty.
    pub fn endpoint_suffix(&self) -> &'static str {
        match self {
            BackendKind::Ollama => "/api/generate",
            BackendKind::LlamaCpp => "/completion",
            BackendKind::Custom => "",
        }
    }

    /// Builds the full inference endpoint URL for an allocated host port
    ///
    /// # Examples
    ///
    /// ```rust
    /// use modelforge::registry::BackendKind;
    ///
    /// assert_eq!(
    ///     BackendKind::Ollama.endpoint_url(11401),
    ///     "http://localhost:11401/api/generate"
    /// );
    /// ```
    pub fn endpoint_url(&self, port: u16) -> String {
        format!("http://localhost:{}{}", port, self.endpoint_suffix())
    }

    /// Returns the string representation used in serialized records
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Ollama => "ollama",
            BackendKind::LlamaCpp => "llamacpp",
            BackendKind::Custom => "custom",
        }
    }

    /// Parses a backend kind from a string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Some(BackendKind::Ollama),
            "llamacpp" | "llama_cpp" | "llama-cpp" => Some(BackendKind::LlamaCpp),
            "custom" => Some(BackendKind::Custom),
            _ => None,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        BackendKind::parse(s).ok_or_else(|| format!("Invalid backend kind: {}", s))
    }
}

/// Control-plane belief about whether a backend is servable
///
/// This is distinct from the backend's own internal readiness: it tracks
/// whether the underlying container process is running.
///
/// # State Machine
///
/// `Starting → Healthy`, `Starting → Unhealthy`, `Healthy ⇄ Unhealthy`.
/// `Stopped` is terminal and assigned only by the delete workflow; the
/// health monitor never produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Container was started but has not yet been observed running
    Starting,

    /// Engine reports the container process as running
    Healthy,

    /// Engine reports the container as not running, missing, or the check
    /// itself failed
    Unhealthy,

    /// Container has been stopped by the delete workflow
    Stopped,
}

impl HealthStatus {
    /// Returns whether a backend in this state can serve inference requests
    pub fn is_servable(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    /// Returns the string representation used in serialized records
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Starting => "starting",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Stopped => "stopped",
        }
    }

    /// Parses a health status from a string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "starting" => Some(HealthStatus::Starting),
            "healthy" => Some(HealthStatus::Healthy),
            "unhealthy" => Some(HealthStatus::Unhealthy),
            "stopped" => Some(HealthStatus::Stopped),
            _ => None,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Registry entry for one running backend container
///
/// This is the unit of truth the control plane keeps per backend. Every
/// field except `health` is immutable after creation; `health` is mutated
/// only by the health monitor and the on-demand health probe.
///
/// Exactly one record exists per live container: `id` and `container_id`
/// are both 1:1 with the record, and `port` is unique across all records
/// present in the registry at any instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendRecord {
    /// Unique identifier (UUID v4), primary key
    pub id: String,

    /// Caller-supplied model name (e.g. "mistral:7b-instruct"), not
    /// guaranteed unique
    pub model_name: String,

    /// Backend container kind
    pub kind: BackendKind,

    /// Engine-assigned container id; required for any lifecycle command
    pub container_id: String,

    /// Full inference endpoint URL, derived from the allocated port and the
    /// kind's path suffix
    pub endpoint: String,

    /// Allocated host port, drawn from the configured range
    pub port: u16,

    /// Creation timestamp
    #[serde(with = "system_time_serde")]
    pub created_at: SystemTime,

    /// Current health belief
    pub health: HealthStatus,
}

impl BackendRecord {
    /// Returns the container id truncated for log lines
    ///
    /// Engine ids are 64-char hex strings; the first 12 characters are the
    /// conventional short form.
    pub fn short_container_id(&self) -> &str {
        let end = self.container_id.len().min(12);
        &self.container_id[..end]
    }
}

/// Request to create a new backend
///
/// `custom_image` is required when `kind` is [`BackendKind::Custom`] and
/// ignored otherwise. `env` is injected into the container's process
/// environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRequest {
    /// Model name (e.g. "mistral:7b-instruct")
    pub model_name: String,

    /// Backend kind to run
    pub kind: BackendKind,

    /// Custom container image (required if kind is custom)
    #[serde(default)]
    pub custom_image: Option<String>,

    /// Environment variables for the container
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl CreateRequest {
    /// Validates the request before the create workflow starts
    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(ForgeError::validation("model name is required"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_table_matches_known_backends() {
        assert_eq!(
            BackendKind::Ollama.default_image(),
            Some("ollama/ollama:latest")
        );
        assert_eq!(
            BackendKind::LlamaCpp.default_image(),
            Some("ghcr.io/ggerganov/llama.cpp:server")
        );
        assert_eq!(BackendKind::Custom.default_image(), None);

        assert_eq!(BackendKind::Ollama.container_port(), 11434);
        assert_eq!(BackendKind::LlamaCpp.container_port(), 8080);
        assert_eq!(BackendKind::Custom.container_port(), 8080);
    }

    #[test]
    fn endpoint_urls_follow_kind_suffix() {
        assert_eq!(
            BackendKind::Ollama.endpoint_url(11401),
            "http://localhost:11401/api/generate"
        );
        assert_eq!(
            BackendKind::LlamaCpp.endpoint_url(11402),
            "http://localhost:11402/completion"
        );
        assert_eq!(
            BackendKind::Custom.endpoint_url(11403),
            "http://localhost:11403"
        );
    }

    #[test]
    fn custom_kind_requires_image() {
        assert!(BackendKind::Custom.resolve_image(None).is_err());
        assert!(BackendKind::Custom.resolve_image(Some("")).is_err());
        assert!(BackendKind::Custom.resolve_image(Some("   ")).is_err());
        assert_eq!(
            BackendKind::Custom.resolve_image(Some("my/image:v1")).unwrap(),
            "my/image:v1"
        );
        // Well-known kinds ignore the custom image
        assert_eq!(
            BackendKind::Ollama.resolve_image(Some("my/image:v1")).unwrap(),
            "ollama/ollama:latest"
        );
    }

    #[test]
    fn kind_round_trips_through_strings() {
        for kind in [BackendKind::Ollama, BackendKind::LlamaCpp, BackendKind::Custom] {
            assert_eq!(BackendKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(BackendKind::parse("LLAMA_CPP"), Some(BackendKind::LlamaCpp));
        assert_eq!(BackendKind::parse("vllm"), None);
    }

    #[test]
    fn health_status_parsing() {
        assert_eq!(HealthStatus::parse("HEALTHY"), Some(HealthStatus::Healthy));
        assert_eq!(HealthStatus::parse("bogus"), None);
        assert!(HealthStatus::Healthy.is_servable());
        assert!(!HealthStatus::Starting.is_servable());
    }

    #[test]
    fn create_request_rejects_blank_model_name() {
        let request = CreateRequest {
            model_name: "  ".to_string(),
            kind: BackendKind::Ollama,
            custom_image: None,
            env: HashMap::new(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn record_serde_round_trip() {
        let record = BackendRecord {
            id: "11111111-2222-3333-4444-555555555555".to_string(),
            model_name: "mistral:7b-instruct".to_string(),
            kind: BackendKind::Ollama,
            container_id: "a".repeat(64),
            endpoint: "http://localhost:11401/api/generate".to_string(),
            port: 11401,
            created_at: std::time::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000),
            health: HealthStatus::Starting,
        };

        let yaml = serde_yaml::to_string(&record).unwrap();
        let parsed: BackendRecord = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(record.short_container_id().len(), 12);
    }
}
