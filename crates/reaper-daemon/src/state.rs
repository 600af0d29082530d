//! Shared HTTP handler state.

use std::sync::Arc;

use crate::metrics::PrometheusMetrics;

/// State shared by the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// The process-wide metrics sink, also written to by the reconcilers.
    pub metrics: Arc<PrometheusMetrics>,
}

impl AppState {
    /// Create a new app state.
    #[must_use]
    pub fn new(metrics: Arc<PrometheusMetrics>) -> Self {
        Self { metrics }
    }
}
