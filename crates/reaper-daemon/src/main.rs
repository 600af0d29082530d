//! Pod reaper daemon.
//!
//! Reaps pods past their `pod.kubernetes.io/lifetime` annotation, optionally
//! cleans up kubelet-evicted pods, and taints spot nodes older than the
//! configured node lifetime. Liveness and Prometheus metrics are served on
//! `LISTEN_ADDR` for as long as the process runs.
//!
//! # Run modes
//!
//! By default the reaper runs a tick every `REAPER_INTERVAL_IN_SEC` seconds
//! until it receives Ctrl-C or SIGTERM. Set `CRON_JOB=true` to run a single
//! tick and exit.

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reaper_cluster::KubeCluster;
use reaper_control::TickDriver;
use reaper_daemon::{create_router, AppState, DaemonError, PrometheusMetrics, Settings};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pod_reaper=debug,reaper=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::parse();

    if let Err(e) = run(settings).await {
        tracing::error!(error = %e, "Pod reaper failed");
        return Err(e.into());
    }
    Ok(())
}

async fn run(settings: Settings) -> Result<(), DaemonError> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting pod reaper");

    let config = settings.to_config()?;
    tracing::info!(
        listen_addr = %settings.listen_addr,
        kubeconfig = ?settings.kubeconfig,
        namespaces = ?config.reap.namespaces,
        max_reap_count = config.reap.max_reap_count,
        evict = config.reap.evict,
        reap_evicted = config.reap.reap_evicted,
        node_lifetime = ?config.nodes.max_age,
        interval_secs = config.interval.as_secs(),
        run_mode = ?config.run_mode,
        "Reaper configuration loaded"
    );

    let cluster = match &settings.kubeconfig {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading kubeconfig");
            KubeCluster::from_kubeconfig(path).await?
        }
        None => KubeCluster::new().await?,
    };
    tracing::info!("Kubernetes client initialized");

    let metrics = Arc::new(PrometheusMetrics::new()?);

    // Start HTTP server
    let listener = tokio::net::TcpListener::bind(&settings.listen_addr)
        .await
        .map_err(|source| DaemonError::Bind {
            addr: settings.listen_addr.clone(),
            source,
        })?;
    let app = create_router(AppState::new(Arc::clone(&metrics)));
    tracing::info!(listen_addr = %settings.listen_addr, "Starting HTTP server");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "HTTP server stopped");
        }
    });

    let driver = TickDriver::new(Arc::new(cluster), metrics, config);
    let ticks = driver.run(shutdown_signal()).await?;

    tracing::info!(ticks, "Pod reaper stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
