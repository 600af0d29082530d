//! Core types and utilities for the pod reaper.
//!
//! This crate provides the foundational pieces shared by every other crate in
//! the workspace:
//!
//! - **Configuration**: the resolved, immutable [`ReaperConfig`] and the
//!   policies derived from it
//! - **Durations**: Go-compatible duration strings (`"1h30m"`, `"72h"`)
//! - **Labels**: the annotation and label keys the reaper acts on
//! - **Metrics**: the [`MetricsSink`] capability the reconcilers publish into
//! - **Error types**: common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use reaper_core::{parse_duration, NamespaceSelection};
//! use std::time::Duration;
//!
//! assert_eq!(parse_duration("1h30m").unwrap().magnitude(), Duration::from_secs(5400));
//! assert_eq!(NamespaceSelection::parse("all").unwrap(), NamespaceSelection::All);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod duration;
pub mod error;
pub mod labels;
pub mod metrics;

pub use config::{NamespaceSelection, NodePolicy, ReapPolicy, ReaperConfig, RunMode};
pub use duration::{parse_duration, SignedDuration};
pub use error::{ConfigError, DurationError, Result};
pub use metrics::{MetricsSink, NodeCategory, PodKind, ReapMethod};

#[cfg(any(test, feature = "test-utils"))]
pub use metrics::recording::RecordingMetrics;
