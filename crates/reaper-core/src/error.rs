//! Common error types for the pod reaper.
//!
//! This module provides shared error types that are used across multiple crates.

use thiserror::Error;

/// A result type using `ConfigError`.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors produced while parsing a duration string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    /// The input was empty.
    #[error("empty duration")]
    Empty,

    /// The input did not follow `<number><unit>` segments.
    #[error("invalid duration: {0:?}")]
    Invalid(String),

    /// A number was followed by no unit.
    #[error("missing unit in duration: {0:?}")]
    MissingUnit(String),

    /// A unit suffix is not recognised.
    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit {
        /// The unrecognised unit.
        unit: String,
        /// The full input string.
        input: String,
    },

    /// The value does not fit in the supported range.
    #[error("duration out of range: {0:?}")]
    Overflow(String),
}

/// Errors raised while resolving the reaper configuration.
///
/// These are bootstrap errors: the process refuses to start when any of them
/// is returned.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The node lifetime threshold is not a valid duration.
    #[error("invalid node lifetime {value:?}: {source}")]
    InvalidNodeLifetime {
        /// The raw configured value.
        value: String,
        /// The underlying parse failure.
        #[source]
        source: DurationError,
    },

    /// The daemon interval must be strictly positive.
    #[error("tick interval must be greater than zero")]
    ZeroInterval,

    /// A namespace entry in the selection list is blank.
    #[error("namespace list {0:?} contains an empty entry")]
    EmptyNamespace(String),
}
