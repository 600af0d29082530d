//! Node lifetime reconciler.
//!
//! Runs in two passes over one node listing: the first aggregates fleet
//! composition per node group and publishes it, the second taints spot nodes
//! that reached the global age threshold.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use reaper_cluster::{ClusterClient, NodeSnapshot, Taint, TaintOutcome};
use reaper_core::labels::{
    NODE_GROUP_LABEL, NODE_LIFECYCLE_LABEL, SHUTDOWN_TAINT_KEY, SHUTDOWN_TAINT_LABEL_VALUE,
    SPOT_LIFECYCLE,
};
use reaper_core::{parse_duration, MetricsSink, NodeCategory, NodePolicy, SignedDuration};

use crate::age_at;

/// Per-node signals derived from labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSignals {
    /// Provisioned on spot capacity.
    pub spot: bool,
    /// Labeled as carrying the shutdown taint.
    ///
    /// This reads the `ci_node` label, not the node's taint list, so it only
    /// approximates the real taint state: a node tainted by this reaper is
    /// not counted until its label is set too.
    pub tainted: bool,
    /// Fleet group name, empty when unlabeled.
    pub group: String,
}

impl NodeSignals {
    /// Derive the signals from a node's labels.
    #[must_use]
    pub fn from_node(node: &NodeSnapshot) -> Self {
        Self {
            spot: is_spot(node),
            tainted: node.label_value(SHUTDOWN_TAINT_KEY) == Some(SHUTDOWN_TAINT_LABEL_VALUE),
            group: node
                .label_value(NODE_GROUP_LABEL)
                .unwrap_or_default()
                .to_string(),
        }
    }
}

/// Node counts for one fleet group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeGroup {
    /// Spot nodes in the group.
    pub spot: u64,
    /// Nodes flagged as tainted.
    pub tainted: u64,
    /// All nodes in the group.
    pub total: u64,
}

impl NodeGroup {
    fn record(&mut self, signals: &NodeSignals) {
        self.spot += u64::from(signals.spot);
        self.tainted += u64::from(signals.tainted);
        self.total += 1;
    }
}

/// Fleet composition keyed by group name.
///
/// Unlabeled nodes are counted under the empty group, so the group totals
/// always add up to the number of nodes listed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFleet {
    groups: BTreeMap<String, NodeGroup>,
}

impl NodeFleet {
    /// Aggregate a node listing.
    #[must_use]
    pub fn from_nodes(nodes: &[NodeSnapshot]) -> Self {
        let mut fleet = Self::default();
        for node in nodes {
            let signals = NodeSignals::from_node(node);
            fleet
                .groups
                .entry(signals.group.clone())
                .or_default()
                .record(&signals);
        }
        fleet
    }

    /// Counts for one group.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&NodeGroup> {
        self.groups.get(name)
    }

    /// Iterate groups in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeGroup)> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns true if no node was aggregated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Sum of a category over all groups.
    #[must_use]
    pub fn sum(&self, category: NodeCategory) -> u64 {
        self.groups
            .values()
            .map(|g| match category {
                NodeCategory::Spot => g.spot,
                NodeCategory::Tainted => g.tainted,
                NodeCategory::Total => g.total,
            })
            .sum()
    }
}

/// Why node reconciliation did not run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeSkip {
    /// No threshold is configured.
    Disabled,
    /// The configured threshold does not parse.
    InvalidThreshold(String),
}

/// Outcome of one node reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeReport {
    /// Set when the reconciliation was skipped entirely.
    pub skipped: Option<NodeSkip>,
    /// Fleet composition as published.
    pub fleet: NodeFleet,
    /// Nodes the taint was written to.
    pub tainted: Vec<String>,
    /// Nodes that already carried the taint.
    pub unchanged: Vec<String>,
    /// Nodes whose taint call failed.
    pub failed: Vec<String>,
}

impl NodeReport {
    fn skipped(reason: NodeSkip) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }
}

/// Taints aged spot nodes and publishes fleet composition.
pub struct NodeReaper<C, M> {
    cluster: Arc<C>,
    metrics: Arc<M>,
    taint: Taint,
}

impl<C, M> NodeReaper<C, M>
where
    C: ClusterClient,
    M: MetricsSink,
{
    /// Create a new node reaper applying the shutdown taint.
    #[must_use]
    pub fn new(cluster: Arc<C>, metrics: Arc<M>) -> Self {
        Self {
            cluster,
            metrics,
            taint: Taint::shutdown(),
        }
    }

    /// Run one node reconciliation.
    pub async fn reconcile(&self, policy: &NodePolicy) -> NodeReport {
        self.reconcile_at(policy, Utc::now()).await
    }

    /// Like [`Self::reconcile`], evaluating ages at `now`.
    pub async fn reconcile_at(&self, policy: &NodePolicy, now: DateTime<Utc>) -> NodeReport {
        let Some(raw) = policy.max_age.as_deref() else {
            info!("Node reaper is disabled");
            return NodeReport::skipped(NodeSkip::Disabled);
        };

        let threshold = match parse_duration(raw) {
            Ok(threshold) => threshold,
            Err(e) => {
                error!(value = raw, error = %e, "Failed to process node lifetime");
                return NodeReport::skipped(NodeSkip::InvalidThreshold(raw.to_string()));
            }
        };

        let nodes = match self.cluster.list_nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(error = %e, "Failed to list nodes, treating as empty");
                Vec::new()
            }
        };

        let fleet = NodeFleet::from_nodes(&nodes);
        self.publish(&fleet);

        let mut report = NodeReport {
            fleet,
            ..NodeReport::default()
        };
        for node in &nodes {
            if !should_taint(node, threshold, now) {
                continue;
            }
            match self.cluster.taint_node(&node.name, &self.taint).await {
                Ok(TaintOutcome::Applied) => {
                    info!(node = %node.name, taint = %self.taint, "Disabled node");
                    report.tainted.push(node.name.clone());
                }
                Ok(TaintOutcome::Unchanged) => {
                    debug!(node = %node.name, "Node already disabled");
                    report.unchanged.push(node.name.clone());
                }
                Err(e) => {
                    error!(
                        node = %node.name,
                        error = %e,
                        "Failed to apply shutdown taint, it may have been deleted"
                    );
                    report.failed.push(node.name.clone());
                }
            }
        }

        info!(
            groups = report.fleet.len(),
            nodes = nodes.len(),
            tainted = report.tainted.len(),
            failed = report.failed.len(),
            "Node reconciliation complete"
        );
        report
    }

    fn publish(&self, fleet: &NodeFleet) {
        for (name, group) in fleet.iter() {
            self.metrics.set_nodes(name, NodeCategory::Spot, group.spot);
            self.metrics.set_nodes(name, NodeCategory::Tainted, group.tainted);
            self.metrics.set_nodes(name, NodeCategory::Total, group.total);
        }
        let live: Vec<&str> = fleet.iter().map(|(name, _)| name).collect();
        self.metrics.retain_node_groups(&live);
    }
}

fn is_spot(node: &NodeSnapshot) -> bool {
    node.label_value(NODE_LIFECYCLE_LABEL) == Some(SPOT_LIFECYCLE)
}

/// A node is tainted once it is spot-labeled and at least `threshold` old.
/// Nodes without a creation time are left alone.
fn should_taint(node: &NodeSnapshot, threshold: SignedDuration, now: DateTime<Utc>) -> bool {
    is_spot(node)
        && node
            .created_at
            .is_some_and(|created| threshold.is_reached_by(age_at(created, now)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use reaper_cluster::MockCluster;
    use reaper_core::RecordingMetrics;

    fn node(
        name: &str,
        group: Option<&str>,
        spot: bool,
        age_hours: i64,
        now: DateTime<Utc>,
    ) -> NodeSnapshot {
        let mut node = NodeSnapshot::new(name).created_at(now - ChronoDuration::hours(age_hours));
        if let Some(group) = group {
            node = node.label(NODE_GROUP_LABEL, group);
        }
        if spot {
            node = node.label(NODE_LIFECYCLE_LABEL, SPOT_LIFECYCLE);
        } else {
            node = node.label(NODE_LIFECYCLE_LABEL, "on-demand");
        }
        node
    }

    fn reaper(
        cluster: &Arc<MockCluster>,
        metrics: &Arc<RecordingMetrics>,
    ) -> NodeReaper<MockCluster, RecordingMetrics> {
        NodeReaper::new(Arc::clone(cluster), Arc::clone(metrics))
    }

    #[test]
    fn signals_from_labels() {
        let now = Utc::now();
        let signals = NodeSignals::from_node(
            &node("n1", Some("ng-a"), true, 1, now).label("ci_node", "Disable:NoSchedule"),
        );
        assert_eq!(
            signals,
            NodeSignals {
                spot: true,
                tainted: true,
                group: "ng-a".to_string()
            }
        );

        let bare = NodeSignals::from_node(&NodeSnapshot::new("n2"));
        assert!(!bare.spot);
        assert!(!bare.tainted);
        assert_eq!(bare.group, "");
    }

    #[test]
    fn fleet_totals_cover_every_node() {
        let now = Utc::now();
        let nodes = vec![
            node("a", Some("ng-a"), true, 1, now),
            node("b", Some("ng-a"), false, 1, now),
            node("c", Some("ng-b"), true, 1, now),
            node("d", None, true, 1, now),
            node("e", None, false, 1, now),
        ];

        let fleet = NodeFleet::from_nodes(&nodes);
        assert_eq!(fleet.len(), 3);
        assert_eq!(
            fleet.group("ng-a"),
            Some(&NodeGroup {
                spot: 1,
                tainted: 0,
                total: 2
            })
        );
        assert_eq!(fleet.group("").map(|g| g.total), Some(2));
        assert_eq!(fleet.sum(NodeCategory::Total), 5);
        assert_eq!(fleet.sum(NodeCategory::Spot), 3);
    }

    #[tokio::test]
    async fn disabled_without_threshold() {
        let cluster = Arc::new(MockCluster::new());
        let metrics = Arc::new(RecordingMetrics::new());

        let report = reaper(&cluster, &metrics).reconcile(&NodePolicy::default()).await;

        assert_eq!(report.skipped, Some(NodeSkip::Disabled));
        assert!(cluster.calls().is_empty());
    }

    #[tokio::test]
    async fn invalid_threshold_skips_tick() {
        let cluster = Arc::new(MockCluster::new());
        let metrics = Arc::new(RecordingMetrics::new());

        let report = reaper(&cluster, &metrics)
            .reconcile(&NodePolicy::with_max_age("three days"))
            .await;

        assert_eq!(
            report.skipped,
            Some(NodeSkip::InvalidThreshold("three days".to_string()))
        );
        assert!(cluster.calls().is_empty());
    }

    #[tokio::test]
    async fn taints_only_old_spot_nodes() {
        let now = Utc::now();
        let cluster = Arc::new(MockCluster::new());
        let metrics = Arc::new(RecordingMetrics::new());
        cluster.add_node(node("old-spot", Some("ng-a"), true, 100, now));
        cluster.add_node(node("young-spot", Some("ng-a"), true, 10, now));
        cluster.add_node(node("old-ondemand", Some("ng-b"), false, 100, now));
        cluster.add_node(NodeSnapshot::new("undated").label(NODE_LIFECYCLE_LABEL, SPOT_LIFECYCLE));

        let report = reaper(&cluster, &metrics)
            .reconcile_at(&NodePolicy::with_max_age("72h"), now)
            .await;

        assert_eq!(report.tainted, vec!["old-spot".to_string()]);
        assert_eq!(cluster.tainted_nodes(), vec!["old-spot".to_string()]);
        assert_eq!(cluster.node_taints("old-spot"), vec![Taint::shutdown()]);
        assert_eq!(metrics.nodes("ng-a", NodeCategory::Spot), Some(2));
        assert_eq!(metrics.nodes("ng-b", NodeCategory::Spot), Some(0));
        assert_eq!(metrics.nodes("", NodeCategory::Total), Some(1));
        assert_eq!(metrics.nodes_total(NodeCategory::Spot), 3);
    }

    #[tokio::test]
    async fn second_run_leaves_taint_unchanged() {
        let now = Utc::now();
        let cluster = Arc::new(MockCluster::new());
        let metrics = Arc::new(RecordingMetrics::new());
        cluster.add_node(node("old-spot", None, true, 100, now));
        let reaper = reaper(&cluster, &metrics);
        let policy = NodePolicy::with_max_age("72h");

        let first = reaper.reconcile_at(&policy, now).await;
        let second = reaper.reconcile_at(&policy, now).await;

        assert_eq!(first.tainted, vec!["old-spot".to_string()]);
        assert!(second.tainted.is_empty());
        assert_eq!(second.unchanged, vec!["old-spot".to_string()]);
        assert_eq!(cluster.node_taints("old-spot").len(), 1);
    }

    #[tokio::test]
    async fn taint_failure_continues() {
        let now = Utc::now();
        let cluster = Arc::new(MockCluster::new());
        let metrics = Arc::new(RecordingMetrics::new());
        cluster.add_node(node("broken", None, true, 100, now));
        cluster.add_node(node("fine", None, true, 100, now));
        cluster.fail_node("broken");

        let report = reaper(&cluster, &metrics)
            .reconcile_at(&NodePolicy::with_max_age("72h"), now)
            .await;

        assert_eq!(report.failed, vec!["broken".to_string()]);
        assert_eq!(report.tainted, vec!["fine".to_string()]);
    }

    #[tokio::test]
    async fn node_list_failure_is_empty_fleet() {
        let cluster = Arc::new(MockCluster::new());
        let metrics = Arc::new(RecordingMetrics::new());
        cluster.fail_node_listing();

        let report = reaper(&cluster, &metrics)
            .reconcile(&NodePolicy::with_max_age("72h"))
            .await;

        assert!(report.skipped.is_none());
        assert!(report.fleet.is_empty());
        assert!(report.tainted.is_empty());
    }

    #[tokio::test]
    async fn stale_groups_are_dropped() {
        let now = Utc::now();
        let metrics = Arc::new(RecordingMetrics::new());
        metrics.set_nodes("gone", NodeCategory::Total, 4);
        let cluster = Arc::new(MockCluster::new());
        cluster.add_node(node("n", Some("ng-a"), false, 1, now));

        reaper(&cluster, &metrics)
            .reconcile_at(&NodePolicy::with_max_age("72h"), now)
            .await;

        assert_eq!(metrics.nodes("gone", NodeCategory::Total), None);
        assert_eq!(metrics.nodes("ng-a", NodeCategory::Total), Some(1));
    }

    #[tokio::test]
    async fn labeled_nodes_count_as_tainted() {
        let now = Utc::now();
        let cluster = Arc::new(MockCluster::new());
        let metrics = Arc::new(RecordingMetrics::new());
        cluster.add_node(
            node("flagged", Some("ng-a"), true, 1, now)
                .label(SHUTDOWN_TAINT_KEY, SHUTDOWN_TAINT_LABEL_VALUE),
        );
        cluster.add_node(node("plain", Some("ng-a"), true, 1, now));

        let report = reaper(&cluster, &metrics)
            .reconcile_at(&NodePolicy::with_max_age("72h"), now)
            .await;

        assert_eq!(report.fleet.sum(NodeCategory::Tainted), 1);
        assert_eq!(metrics.nodes("ng-a", NodeCategory::Tainted), Some(1));
        assert_eq!(metrics.nodes("ng-a", NodeCategory::Total), Some(2));
    }

    #[tokio::test]
    async fn node_at_exact_threshold_is_tainted() {
        let now = Utc::now();
        let cluster = Arc::new(MockCluster::new());
        let metrics = Arc::new(RecordingMetrics::new());
        cluster.add_node(node("boundary", None, true, 72, now));
        cluster.add_node(node("younger", None, true, 71, now));

        let report = reaper(&cluster, &metrics)
            .reconcile_at(&NodePolicy::with_max_age("72h"), now)
            .await;

        assert_eq!(report.tainted, vec!["boundary".to_string()]);
    }

    #[tokio::test]
    async fn negative_threshold_taints_every_dated_spot_node() {
        let now = Utc::now();
        let cluster = Arc::new(MockCluster::new());
        let metrics = Arc::new(RecordingMetrics::new());
        cluster.add_node(node("fresh-spot", None, true, 0, now));
        cluster.add_node(node("fresh-ondemand", None, false, 0, now));
        cluster.add_node(NodeSnapshot::new("undated").label(NODE_LIFECYCLE_LABEL, SPOT_LIFECYCLE));

        let report = reaper(&cluster, &metrics)
            .reconcile_at(&NodePolicy::with_max_age("-1h"), now)
            .await;

        assert!(report.skipped.is_none());
        assert_eq!(report.tainted, vec!["fresh-spot".to_string()]);
    }

    #[tokio::test]
    async fn live_groups_stay_published_across_passes() {
        let now = Utc::now();
        let cluster = Arc::new(MockCluster::new());
        let metrics = Arc::new(RecordingMetrics::new());
        cluster.add_node(node("n", Some("ng-a"), true, 1, now));
        let reaper = reaper(&cluster, &metrics);
        let policy = NodePolicy::with_max_age("72h");

        reaper.reconcile_at(&policy, now).await;
        cluster.add_node(node("m", Some("ng-a"), true, 1, now));
        reaper.reconcile_at(&policy, now).await;

        assert_eq!(metrics.nodes("ng-a", NodeCategory::Spot), Some(2));
        assert_eq!(metrics.nodes("ng-a", NodeCategory::Total), Some(2));
    }
}
