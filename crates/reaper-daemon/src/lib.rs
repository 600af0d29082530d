//! Pod reaper daemon.
//!
//! Wires the reconcilers from `reaper-control` to a live cluster and exposes
//! the process over HTTP:
//!
//! - [`Settings`]: flags and environment variables, resolved into a
//!   validated [`ReaperConfig`](reaper_core::ReaperConfig)
//! - [`PrometheusMetrics`]: the process-wide
//!   [`MetricsSink`](reaper_core::MetricsSink)
//! - [`create_router`]: liveness, health, and metrics endpoints
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 pod-reaper                   │
//! │  ┌────────────┐          ┌────────────────┐  │
//! │  │ TickDriver │─metrics─▶│ Prometheus     │◀─┼── GET /metrics
//! │  │ (pods,     │          │ registry       │  │
//! │  │  nodes)    │          └────────────────┘  │
//! │  └────────────┘                              │
//! └────────┬─────────────────────────────────────┘
//!          │ list / delete / evict / taint
//!          ▼
//!   ┌──────────────┐
//!   │ Kubernetes   │
//!   │ API server   │
//!   └──────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod settings;
pub mod state;

pub use error::DaemonError;
pub use metrics::PrometheusMetrics;
pub use routes::create_router;
pub use settings::Settings;
pub use state::AppState;
