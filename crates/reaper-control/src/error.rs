//! Error types for the reconcilers.
//!
//! Only failures that must stop the process are represented here. Malformed
//! durations and failed TTL reaps or taint calls are logged and recovered
//! inside the reconcilers and never surface as a `ControlError`.

use reaper_cluster::ClusterError;
use thiserror::Error;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Fatal errors raised by a reconciliation tick.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Pods in a namespace could not be listed.
    #[error("failed to list pods in namespace {namespace}: {source}")]
    ListPods {
        /// The namespace (or `all`) being listed.
        namespace: String,
        /// The underlying cluster error.
        #[source]
        source: ClusterError,
    },

    /// A pod already evicted by the kubelet could not be deleted.
    ///
    /// Unlike TTL reaps, which log and continue, this aborts the process.
    #[error("failed to delete evicted pod {namespace}/{name}: {source}")]
    EvictedCleanup {
        /// Pod namespace.
        namespace: String,
        /// Pod name.
        name: String,
        /// The underlying cluster error.
        #[source]
        source: ClusterError,
    },
}
