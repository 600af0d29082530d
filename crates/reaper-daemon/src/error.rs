//! Daemon error types.
//!
//! Every variant ends the process with a non-zero exit code.

use thiserror::Error;

use reaper_cluster::ClusterError;
use reaper_control::ControlError;
use reaper_core::ConfigError;

/// Errors that stop the daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Settings did not validate.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The Kubernetes client could not be created.
    #[error("cluster client: {0}")]
    Cluster(#[from] ClusterError),

    /// The metrics registry could not be set up.
    #[error("metrics registry: {0}")]
    Metrics(#[from] prometheus::Error),

    /// The HTTP listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The requested listen address.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A reconciliation tick failed fatally.
    #[error(transparent)]
    Control(#[from] ControlError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_message() {
        let err = DaemonError::from(ConfigError::ZeroInterval);
        assert!(err.to_string().starts_with("invalid configuration:"));
    }

    #[test]
    fn bind_error_names_address() {
        let err = DaemonError::Bind {
            addr: "0.0.0.0:8080".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(err.to_string().contains("0.0.0.0:8080"));
    }
}
