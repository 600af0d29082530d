//! Metrics capability consumed by the reconcilers.
//!
//! Reconcilers never touch a global registry; they publish through a
//! [`MetricsSink`] handed to them at construction. The binary wires a single
//! Prometheus-backed instance, tests use [`recording::RecordingMetrics`].

use std::fmt;

/// How a pod was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReapMethod {
    /// Deleted after exceeding its lifetime.
    Deleted,
    /// Evicted after exceeding its lifetime.
    Evicted,
    /// Deleted because the kubelet had already evicted it.
    Killed,
}

impl ReapMethod {
    /// Metric label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deleted => "deleted",
            Self::Evicted => "evicted",
            Self::Killed => "killed",
        }
    }
}

impl fmt::Display for ReapMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a pod carries the lifetime annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PodKind {
    /// Annotated pods.
    Tracking,
    /// Pods without the annotation.
    Ignoring,
}

impl PodKind {
    /// Metric label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tracking => "tracking",
            Self::Ignoring => "ignoring",
        }
    }
}

/// Node gauge category within a fleet group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeCategory {
    /// Spot-labeled nodes.
    Spot,
    /// Nodes flagged as carrying the shutdown taint.
    Tainted,
    /// All nodes.
    Total,
}

impl NodeCategory {
    /// Metric label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Spot => "spot",
            Self::Tainted => "tainted",
            Self::Total => "total",
        }
    }
}

/// Sink for reaper metrics.
///
/// Implementations must tolerate concurrent calls.
pub trait MetricsSink: Send + Sync {
    /// Add `count` reaped pods for a namespace and method.
    fn add_reaped(&self, namespace: &str, method: ReapMethod, count: u64);

    /// Set the number of detected pods for a namespace and kind.
    fn set_pods(&self, namespace: &str, kind: PodKind, count: u64);

    /// Set the number of nodes for a fleet group and category.
    fn set_nodes(&self, group: &str, category: NodeCategory, count: u64);

    /// Drop the node gauges of every group not in `groups`.
    ///
    /// Called after a fresh fleet snapshot was set, so the gauges of live
    /// groups are never missing.
    fn retain_node_groups(&self, groups: &[&str]) {
        let _ = groups;
    }
}

/// In-memory sink for tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod recording {
    use std::collections::BTreeMap;

    use parking_lot::Mutex;

    use super::{MetricsSink, NodeCategory, PodKind, ReapMethod};

    /// A metrics sink that records every value in memory.
    #[derive(Debug, Default)]
    pub struct RecordingMetrics {
        reaped: Mutex<BTreeMap<(String, ReapMethod), u64>>,
        pods: Mutex<BTreeMap<(String, PodKind), u64>>,
        nodes: Mutex<BTreeMap<(String, NodeCategory), u64>>,
    }

    impl RecordingMetrics {
        /// Create an empty recorder.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Accumulated reaped count for a namespace and method.
        #[must_use]
        pub fn reaped(&self, namespace: &str, method: ReapMethod) -> u64 {
            self.reaped
                .lock()
                .get(&(namespace.to_string(), method))
                .copied()
                .unwrap_or(0)
        }

        /// Last pod gauge value, if ever set.
        #[must_use]
        pub fn pods(&self, namespace: &str, kind: PodKind) -> Option<u64> {
            self.pods.lock().get(&(namespace.to_string(), kind)).copied()
        }

        /// Last node gauge value, if its group is still retained.
        #[must_use]
        pub fn nodes(&self, group: &str, category: NodeCategory) -> Option<u64> {
            self.nodes.lock().get(&(group.to_string(), category)).copied()
        }

        /// Sum of a node category across every group.
        #[must_use]
        pub fn nodes_total(&self, category: NodeCategory) -> u64 {
            self.nodes
                .lock()
                .iter()
                .filter(|((_, c), _)| *c == category)
                .map(|(_, v)| *v)
                .sum()
        }
    }

    impl MetricsSink for RecordingMetrics {
        fn add_reaped(&self, namespace: &str, method: ReapMethod, count: u64) {
            *self
                .reaped
                .lock()
                .entry((namespace.to_string(), method))
                .or_default() += count;
        }

        fn set_pods(&self, namespace: &str, kind: PodKind, count: u64) {
            self.pods.lock().insert((namespace.to_string(), kind), count);
        }

        fn set_nodes(&self, group: &str, category: NodeCategory, count: u64) {
            self.nodes.lock().insert((group.to_string(), category), count);
        }

        fn retain_node_groups(&self, groups: &[&str]) {
            self.nodes
                .lock()
                .retain(|(group, _), _| groups.contains(&group.as_str()));
        }
    }
}
