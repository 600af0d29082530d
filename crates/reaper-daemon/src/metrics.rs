//! Prometheus-backed metrics sink.

use std::collections::BTreeSet;

use parking_lot::Mutex;
use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

use reaper_core::{MetricsSink, NodeCategory, PodKind, ReapMethod};

/// Reaper metrics registered in a private registry.
///
/// One instance is created at startup and shared by both reconcilers and the
/// `/metrics` handler.
pub struct PrometheusMetrics {
    registry: Registry,
    reaped: IntCounterVec,
    pods: IntGaugeVec,
    nodes: IntGaugeVec,
    node_groups: Mutex<BTreeSet<String>>,
}

impl PrometheusMetrics {
    /// Create and register the reaper metrics.
    ///
    /// # Errors
    ///
    /// Returns an error if a metric cannot be created or registered.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let reaped = IntCounterVec::new(
            Opts::new("pod_reaper_reaped", "Pods reaped by namespace and method"),
            &["namespace", "method"],
        )?;
        registry.register(Box::new(reaped.clone()))?;

        let pods = IntGaugeVec::new(
            Opts::new(
                "pod_reaper_detected",
                "Pods seen in the last tick by namespace and annotation state",
            ),
            &["namespace", "kind"],
        )?;
        registry.register(Box::new(pods.clone()))?;

        let nodes = IntGaugeVec::new(
            Opts::new("node_reaper_detected", "Nodes by node group and category"),
            &["nodegroups", "nodes"],
        )?;
        registry.register(Box::new(nodes.clone()))?;

        Ok(Self {
            registry,
            reaped,
            pods,
            nodes,
            node_groups: Mutex::new(BTreeSet::new()),
        })
    }

    /// Render every registered metric in the Prometheus text format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode(&self) -> prometheus::Result<String> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

fn gauge_value(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl MetricsSink for PrometheusMetrics {
    fn add_reaped(&self, namespace: &str, method: ReapMethod, count: u64) {
        self.reaped
            .with_label_values(&[namespace, method.as_str()])
            .inc_by(count);
    }

    fn set_pods(&self, namespace: &str, kind: PodKind, count: u64) {
        self.pods
            .with_label_values(&[namespace, kind.as_str()])
            .set(gauge_value(count));
    }

    fn set_nodes(&self, group: &str, category: NodeCategory, count: u64) {
        self.nodes
            .with_label_values(&[group, category.as_str()])
            .set(gauge_value(count));
        self.node_groups.lock().insert(group.to_string());
    }

    fn retain_node_groups(&self, groups: &[&str]) {
        let mut known = self.node_groups.lock();
        known.retain(|group| {
            if groups.contains(&group.as_str()) {
                return true;
            }
            for category in [NodeCategory::Spot, NodeCategory::Tainted, NodeCategory::Total] {
                // A category that was never set has no series to remove.
                let _ = self.nodes.remove_label_values(&[group.as_str(), category.as_str()]);
            }
            false
        });
    }
}
