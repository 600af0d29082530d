//! Tick scheduling.
//!
//! A tick is one pod pass followed by one node pass. The driver runs ticks in
//! a loop separated by the configured interval, or exactly once.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info};

use reaper_cluster::ClusterClient;
use reaper_core::{MetricsSink, ReaperConfig, RunMode};

use crate::error::Result;
use crate::nodes::{NodeReaper, NodeReport};
use crate::pods::{NamespaceStats, PodReaper};

/// Outcome of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Per-scope pod statistics, in selection order.
    pub namespaces: Vec<NamespaceStats>,
    /// Node pass outcome.
    pub nodes: NodeReport,
}

/// Drives reconciliation ticks.
pub struct TickDriver<C, M> {
    pods: PodReaper<C, M>,
    nodes: NodeReaper<C, M>,
    config: ReaperConfig,
}

impl<C, M> TickDriver<C, M>
where
    C: ClusterClient,
    M: MetricsSink,
{
    /// Create a driver sharing one cluster client and one metrics sink
    /// between both reconcilers.
    #[must_use]
    pub fn new(cluster: Arc<C>, metrics: Arc<M>, config: ReaperConfig) -> Self {
        Self {
            pods: PodReaper::new(Arc::clone(&cluster), Arc::clone(&metrics)),
            nodes: NodeReaper::new(cluster, metrics),
            config,
        }
    }

    /// The configuration in effect.
    #[must_use]
    pub fn config(&self) -> &ReaperConfig {
        &self.config
    }

    /// Run a single tick.
    ///
    /// # Errors
    ///
    /// Returns a fatal pod-pass error. The node pass is skipped in that case.
    pub async fn run_tick(&self) -> Result<TickReport> {
        let namespaces = self.pods.reconcile_selection(&self.config.reap).await?;
        let nodes = self.nodes.reconcile(&self.config.nodes).await;
        Ok(TickReport { namespaces, nodes })
    }

    /// Run ticks until `shutdown` resolves, or once in [`RunMode::Once`].
    ///
    /// Shutdown is observed between ticks; a tick in progress always
    /// completes. Returns the number of completed ticks.
    ///
    /// # Errors
    ///
    /// Returns the first fatal tick error.
    pub async fn run<F>(&self, shutdown: F) -> Result<u64>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut ticks = 0u64;

        loop {
            self.run_tick().await?;
            ticks += 1;
            debug!(tick = ticks, "Tick complete");

            if self.config.run_mode == RunMode::Once {
                info!("Single run complete");
                return Ok(ticks);
            }

            tokio::select! {
                () = tokio::time::sleep(self.config.interval) => {}
                () = &mut shutdown => {
                    info!(ticks, "Shutdown requested, stopping reaper");
                    return Ok(ticks);
                }
            }
        }
    }
}
