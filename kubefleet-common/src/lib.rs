//! Common types shared by the kubefleet core and its callers
//!
//! Holds the persisted data model (clusters, users), the resource addressing
//! types used by the operator, and the error taxonomy every layer returns.

pub mod cluster;
pub mod resource;
pub mod user;

pub use cluster::{Cluster, ClusterStatus, CredentialBlob};
pub use resource::{ClusterOptions, ListOptions, ObjectOptions, ResourceKind, ResourceRef};
pub use user::{User, UserStatus};

/// Errors returned by the registry, the resource operator and the persistence facade
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A cluster with this name is already registered
    #[error("Cluster already registered: {0}")]
    DuplicateName(String),

    /// The credential blob could not be turned into connection parameters
    #[error("Invalid cluster configuration: {0}")]
    InvalidConfig(String),

    /// The connectivity probe failed or timed out during registration or rotation
    #[error("Failed to connect to cluster '{cluster}': {reason}")]
    ConnectionFailed { cluster: String, reason: String },

    /// No registry entry exists for this name
    #[error("Cluster not registered: {0}")]
    NotRegistered(String),

    /// The cluster exists but cannot serve calls right now
    #[error("Cluster '{cluster}' unavailable: {reason}")]
    ClusterUnavailable { cluster: String, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Stale resourceVersion; the caller must re-fetch and retry
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Transport failure or deadline exceeded on a remote call
    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown error: {0}")]
    Unknown(String),

    /// The persistence layer failed
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Short stable code for logs and callers that branch on the kind of failure
    pub fn code(&self) -> &'static str {
        match self {
            Error::DuplicateName(_) => "duplicate_name",
            Error::InvalidConfig(_) => "invalid_config",
            Error::ConnectionFailed { .. } => "connection_failed",
            Error::NotRegistered(_) => "not_registered",
            Error::ClusterUnavailable { .. } => "cluster_unavailable",
            Error::NotFound(_) => "not_found",
            Error::AlreadyExists(_) => "already_exists",
            Error::Conflict(_) => "conflict",
            Error::PermissionDenied(_) => "permission_denied",
            Error::Unavailable(_) => "unavailable",
            Error::Unknown(_) => "unknown",
            Error::Storage(_) => "storage",
            Error::Config(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_identifiers() {
        let err = Error::ConnectionFailed {
            cluster: "prod-eu".to_string(),
            reason: "probe timed out".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to connect to cluster 'prod-eu': probe timed out"
        );
        assert_eq!(err.code(), "connection_failed");
    }

    #[test]
    fn test_error_codes_are_distinct_for_registry_failures() {
        let unregistered = Error::NotRegistered("a".to_string());
        let unavailable = Error::ClusterUnavailable {
            cluster: "a".to_string(),
            reason: "unhealthy".to_string(),
        };
        assert_ne!(unregistered.code(), unavailable.code());
    }
}
