//! Error types for the cluster crate.

use thiserror::Error;

/// Errors that can occur while talking to the cluster.
#[derive(Error, Debug)]
pub enum ClusterError {
    /// Kubernetes API error.
    #[error("Kubernetes API error: {0}")]
    KubeApi(#[from] kube::Error),

    /// Node not found in the cluster.
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Client configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Injected failure from the mock cluster.
    #[cfg(any(test, feature = "test-utils"))]
    #[error("Injected failure: {0}")]
    Injected(String),
}

impl ClusterError {
    /// Check if this error means the target object does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::KubeApi(kube::Error::Api(e)) => e.code == 404,
            Self::NodeNotFound(_) => true,
            _ => false,
        }
    }

    /// Check if this error is a write conflict on a stale resource version.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::KubeApi(kube::Error::Api(e)) if e.code == 409)
    }

    /// Check if this error is retriable on a later tick.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::KubeApi(kube::Error::Api(e)) => e.code == 429 || e.code >= 500,
            Self::KubeApi(_) => true,
            _ => false,
        }
    }
}

/// A specialized Result type for cluster operations.
pub type Result<T> = std::result::Result<T, ClusterError>;
