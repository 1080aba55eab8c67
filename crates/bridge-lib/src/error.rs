//! Error types for bridge operations

use std::time::Duration;
use thiserror::Error;

/// Result alias used across the library
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by the orchestration platform adapter
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Kubernetes / OpenShift API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The platform rejected or failed a request
    #[error("platform API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A resource could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Client configuration could not be loaded
    #[error("platform configuration error: {0}")]
    Config(String),
}

impl PlatformError {
    /// Create an API error with the given status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }
}

/// Errors raised by the container engine adapter
#[derive(Debug, Error)]
pub enum EngineError {
    /// Transport-level failure talking to the engine
    #[error("engine request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The engine answered with a non-success status
    #[error("engine API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid engine endpoint
    #[error("invalid engine URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Main error type for container lifecycle operations
#[derive(Debug, Error)]
pub enum Error {
    /// An expected project, service, deployment or replication unit is missing
    #[error("{kind} '{name}' not found")]
    ResourceNotFound { kind: &'static str, name: String },

    /// Zero or more than one pod carries an identity label
    #[error("expected exactly one pod with label {selector}, found {matches}")]
    AmbiguousDiscovery { selector: String, matches: usize },

    /// The runtime container never materialized within the polling ceiling
    #[error("container for deployment '{deployment}' not discovered after {attempts} attempts ({waited:?})")]
    DiscoveryTimeout {
        deployment: String,
        attempts: u32,
        waited: Duration,
    },

    /// A workspace-files job pod ended in phase Failed
    #[error("workspace files job '{pod}' failed")]
    JobFailed { pod: String },

    /// A workspace-files job pod did not finish within the polling ceiling
    #[error("workspace files job '{pod}' not finished after {attempts} attempts ({waited:?})")]
    JobTimeout {
        pod: String,
        attempts: u32,
        waited: Duration,
    },

    /// The operation was cancelled before it completed
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// The container request cannot be translated
    #[error("invalid container spec: {0}")]
    InvalidSpec(String),

    /// The bridge itself is misconfigured
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Orchestration platform call failed
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// Container engine call failed
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl Error {
    /// Create a resource-not-found error
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::ResourceNotFound {
            kind,
            name: name.into(),
        }
    }

    /// Create an invalid-spec error with the given message
    pub fn invalid_spec(msg: impl Into<String>) -> Self {
        Self::InvalidSpec(msg.into())
    }

    /// Stable snake_case name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::ResourceNotFound { .. } => "resource_not_found",
            Error::AmbiguousDiscovery { .. } => "ambiguous_discovery",
            Error::DiscoveryTimeout { .. } => "discovery_timeout",
            Error::JobFailed { .. } => "job_failed",
            Error::JobTimeout { .. } => "job_timeout",
            Error::Cancelled(_) => "cancelled",
            Error::InvalidSpec(_) => "invalid_spec",
            Error::Configuration(_) => "configuration",
            Error::Platform(_) => "platform",
            Error::Engine(_) => "engine",
        }
    }

    /// True for missing resources, including an identity label matching no pod
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::ResourceNotFound { .. } => true,
            Error::AmbiguousDiscovery { matches, .. } => *matches == 0,
            _ => false,
        }
    }
}
