//! Types for the cluster crate.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reaper_core::labels::{SHUTDOWN_TAINT_KEY, SHUTDOWN_TAINT_VALUE};

/// Point-in-time view of a pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSnapshot {
    /// Namespace of the pod.
    pub namespace: String,
    /// Pod name.
    pub name: String,
    /// When the pod object was created.
    pub created_at: Option<DateTime<Utc>>,
    /// Pod annotations.
    pub annotations: BTreeMap<String, String>,
    /// `status.reason`, e.g. `Evicted`.
    pub status_reason: Option<String>,
}

impl PodSnapshot {
    /// Create a snapshot with no creation time, annotations or status reason.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            created_at: None,
            annotations: BTreeMap::new(),
            status_reason: None,
        }
    }

    /// Set the creation time.
    #[must_use]
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Add an annotation.
    #[must_use]
    pub fn annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Set the status reason.
    #[must_use]
    pub fn status_reason(mut self, reason: impl Into<String>) -> Self {
        self.status_reason = Some(reason.into());
        self
    }
}

/// Point-in-time view of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// Node name.
    pub name: String,
    /// When the node object was created.
    pub created_at: Option<DateTime<Utc>>,
    /// Node labels.
    pub labels: BTreeMap<String, String>,
}

impl NodeSnapshot {
    /// Create a snapshot with no creation time or labels.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: None,
            labels: BTreeMap::new(),
        }
    }

    /// Set the creation time.
    #[must_use]
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Add a label.
    #[must_use]
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Value of a label, if present.
    #[must_use]
    pub fn label_value(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Effect of a node taint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaintEffect {
    /// New pods are not scheduled unless they tolerate the taint.
    NoSchedule,
    /// The scheduler tries to avoid the node.
    PreferNoSchedule,
    /// Running pods without a toleration are evicted.
    NoExecute,
}

impl TaintEffect {
    /// The Kubernetes API spelling of the effect.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoSchedule => "NoSchedule",
            Self::PreferNoSchedule => "PreferNoSchedule",
            Self::NoExecute => "NoExecute",
        }
    }
}

impl fmt::Display for TaintEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node taint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Taint {
    /// Taint key.
    pub key: String,
    /// Taint value.
    pub value: String,
    /// Taint effect.
    pub effect: TaintEffect,
}

impl Taint {
    /// The taint applied to spot nodes past the age threshold.
    #[must_use]
    pub fn shutdown() -> Self {
        Self {
            key: SHUTDOWN_TAINT_KEY.to_string(),
            value: SHUTDOWN_TAINT_VALUE.to_string(),
            effect: TaintEffect::NoSchedule,
        }
    }
}

impl fmt::Display for Taint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}:{}", self.key, self.value, self.effect)
    }
}

/// Result of an add-or-update taint call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaintOutcome {
    /// The taint was added or its value replaced.
    Applied,
    /// An identical taint was already present; nothing was written.
    Unchanged,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_taint_identity() {
        let taint = Taint::shutdown();
        assert_eq!(taint.key, "ci_node");
        assert_eq!(taint.value, "Disable");
        assert_eq!(taint.effect, TaintEffect::NoSchedule);
        assert_eq!(taint.to_string(), "ci_node=Disable:NoSchedule");
    }

    #[test]
    fn snapshot_builders() {
        let pod = PodSnapshot::new("default", "web-0")
            .annotation("a", "b")
            .status_reason("Evicted");
        assert_eq!(pod.annotations.get("a").map(String::as_str), Some("b"));
        assert_eq!(pod.status_reason.as_deref(), Some("Evicted"));
        assert!(pod.created_at.is_none());

        let node = NodeSnapshot::new("ip-10-0-0-1").label("node-lifecycle", "spot");
        assert_eq!(node.label_value("node-lifecycle"), Some("spot"));
        assert_eq!(node.label_value("missing"), None);
    }
}
