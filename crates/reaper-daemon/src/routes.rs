//! Router configuration.

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers::{health, metrics};
use crate::state::AppState;

/// Create the daemon router.
///
/// # Routes
///
/// - `GET /` - Liveness probe, answers `ok`
/// - `GET /health` - Health check with version
/// - `GET /metrics` - Prometheus metrics
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::liveness))
        .route("/health", get(health::health))
        .route("/metrics", get(metrics::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum_test::TestServer;
    use reaper_core::{MetricsSink, PodKind, ReapMethod};

    use super::*;
    use crate::metrics::PrometheusMetrics;

    fn server() -> (TestServer, Arc<PrometheusMetrics>) {
        let metrics = Arc::new(PrometheusMetrics::new().unwrap());
        let app = create_router(AppState::new(Arc::clone(&metrics)));
        (TestServer::new(app).unwrap(), metrics)
    }

    #[tokio::test]
    async fn root_is_liveness() {
        let (server, _) = server();

        let response = server.get("/").await;

        response.assert_status_ok();
        response.assert_text("ok\n");
    }

    #[tokio::test]
    async fn health_reports_version() {
        let (server, _) = server();

        let response = server.get("/health").await;

        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn metrics_exposes_sink_writes() {
        let (server, metrics) = server();
        metrics.add_reaped("all", ReapMethod::Evicted, 4);
        metrics.set_pods("all", PodKind::Ignoring, 7);

        let response = server.get("/metrics").await;

        response.assert_status_ok();
        let text = response.text();
        assert!(text.contains(r#"pod_reaper_reaped{method="evicted",namespace="all"} 4"#));
        assert!(text.contains(r#"pod_reaper_detected{kind="ignoring",namespace="all"} 7"#));
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let (server, _) = server();

        let response = server.get("/unknown").await;

        response.assert_status(StatusCode::NOT_FOUND);
    }
}
