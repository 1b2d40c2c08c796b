//! Error types for the Image Registry Operator
//!
//! Every failure that can leave a reconcile pass is an [`Error`]. Errors are
//! classified as permanent (caused by the user's configuration, retrying
//! will not help until the object is edited) or transient (expected to
//! resolve on a later pass).

use crate::crd::StorageKind;
use thiserror::Error;

/// Unified error type for the operator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    #[error("Conflicting update of {kind}/{name}")]
    Conflict { kind: String, name: String },

    // =========================================================================
    // Storage Errors
    // =========================================================================
    #[error("storage backend not configured")]
    StorageNotConfigured,

    #[error(
        "exactly one storage type should be configured at the same time, got {}: [{}]",
        .backends.len(),
        join_kinds(.backends)
    )]
    AmbiguousStorage { backends: Vec<StorageKind> },

    #[error("invalid configuration for {backend} storage: {reason}")]
    InvalidStorageConfiguration { backend: StorageKind, reason: String },

    #[error("Backend operation failed: {backend} - {operation}: {reason}")]
    BackendOperationFailed {
        backend: String,
        operation: String,
        reason: String,
    },

    // =========================================================================
    // Platform Errors
    // =========================================================================
    #[error("unable to get storage configuration from cluster install config: {0}")]
    PlatformDetection(String),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // Metrics / IO Errors
    // =========================================================================
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Whether retrying a failed pass is expected to help
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Invalid user input; stays failing until the object is edited
    Permanent,
    /// API unavailability, conflicts, dependencies not ready
    Transient,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Permanent => write!(f, "permanent"),
            ErrorClass::Transient => write!(f, "transient"),
        }
    }
}

impl Error {
    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::StorageNotConfigured
            | Error::AmbiguousStorage { .. }
            | Error::InvalidStorageConfiguration { .. }
            | Error::Configuration(_) => ErrorClass::Permanent,

            _ => ErrorClass::Transient,
        }
    }

    /// Check if this error is caused by invalid configuration
    pub fn is_permanent(&self) -> bool {
        self.class() == ErrorClass::Permanent
    }

    /// Check if this error is expected to resolve on retry
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Check if this error is a write conflict (HTTP 409)
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict { .. } => true,
            Error::Kube(kube::Error::Api(resp)) => resp.code == 409,
            _ => false,
        }
    }

    /// Check if this error reports a missing object (HTTP 404)
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::ResourceNotFound { .. } => true,
            Error::Kube(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// Map a kube error for a named object, lifting 404 and 409
    pub fn from_kube(kind: &str, name: &str, err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(resp) if resp.code == 404 => Error::ResourceNotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            kube::Error::Api(resp) if resp.code == 409 => Error::Conflict {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            _ => Error::Kube(err),
        }
    }

    /// Build a permanent validation failure
    pub fn invalid(backend: StorageKind, reason: impl Into<String>) -> Self {
        Error::InvalidStorageConfiguration {
            backend,
            reason: reason.into(),
        }
    }
}

fn join_kinds(kinds: &[StorageKind]) -> String {
    kinds
        .iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for the operator
pub type Result<T> = std::result::Result<T, Error>;
