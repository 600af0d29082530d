//! Conversions between Kubernetes API objects and reaper snapshots.
//!
//! Objects missing a name are dropped; every other optional field maps onto an
//! `Option` or an empty map in the snapshot.

use k8s_openapi::api::core::v1::{Node, Pod, Taint as K8sTaint};
use tracing::warn;

use crate::types::{NodeSnapshot, PodSnapshot, Taint};

/// Flatten a pod into a snapshot.
///
/// `fallback_namespace` is used when the object carries no namespace, which
/// only happens for hand-built objects.
#[must_use]
pub fn pod_snapshot(pod: &Pod, fallback_namespace: &str) -> Option<PodSnapshot> {
    let Some(name) = pod.metadata.name.clone() else {
        warn!(namespace = fallback_namespace, "Skipping pod without a name");
        return None;
    };

    let namespace = pod
        .metadata
        .namespace
        .clone()
        .unwrap_or_else(|| fallback_namespace.to_string());

    Some(PodSnapshot {
        namespace,
        name,
        created_at: pod.metadata.creation_timestamp.as_ref().map(|t| t.0),
        annotations: pod.metadata.annotations.clone().unwrap_or_default(),
        status_reason: pod.status.as_ref().and_then(|s| s.reason.clone()),
    })
}

/// Flatten a node into a snapshot.
#[must_use]
pub fn node_snapshot(node: &Node) -> Option<NodeSnapshot> {
    let Some(name) = node.metadata.name.clone() else {
        warn!("Skipping node without a name");
        return None;
    };

    Some(NodeSnapshot {
        name,
        created_at: node.metadata.creation_timestamp.as_ref().map(|t| t.0),
        labels: node.metadata.labels.clone().unwrap_or_default(),
    })
}

/// Build the Kubernetes representation of a taint.
#[must_use]
pub fn to_k8s_taint(taint: &Taint) -> K8sTaint {
    K8sTaint {
        key: taint.key.clone(),
        value: Some(taint.value.clone()),
        effect: taint.effect.as_str().to_string(),
        time_added: None,
    }
}

/// Compute a node's taint list after adding or updating `taint`.
///
/// A taint is identified by key and effect. Returns `None` when an identical
/// taint is already present, otherwise the new list with any same-identity
/// taint replaced.
#[must_use]
pub fn upsert_taint(existing: &[K8sTaint], taint: &Taint) -> Option<Vec<K8sTaint>> {
    let effect = taint.effect.as_str();
    let same_identity = |t: &K8sTaint| t.key == taint.key && t.effect == effect;

    if existing
        .iter()
        .any(|t| same_identity(t) && t.value.as_deref() == Some(taint.value.as_str()))
    {
        return None;
    }

    let mut taints: Vec<K8sTaint> = existing
        .iter()
        .filter(|t| !same_identity(t))
        .cloned()
        .collect();
    taints.push(to_k8s_taint(taint));
    Some(taints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use k8s_openapi::api::core::v1::PodStatus;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn k8s_taint(key: &str, value: &str, effect: &str) -> K8sTaint {
        K8sTaint {
            key: key.to_string(),
            value: Some(value.to_string()),
            effect: effect.to_string(),
            time_added: None,
        }
    }

    #[test]
    fn pod_snapshot_copies_fields() {
        let created = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("web-0".to_string()),
                namespace: Some("default".to_string()),
                creation_timestamp: Some(Time(created)),
                annotations: Some(BTreeMap::from([(
                    "pod.kubernetes.io/lifetime".to_string(),
                    "1h".to_string(),
                )])),
                ..Default::default()
            },
            status: Some(PodStatus {
                reason: Some("Evicted".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let snapshot = pod_snapshot(&pod, "other").unwrap();
        assert_eq!(snapshot.namespace, "default");
        assert_eq!(snapshot.name, "web-0");
        assert_eq!(snapshot.created_at, Some(created));
        assert_eq!(
            snapshot.annotations.get("pod.kubernetes.io/lifetime").map(String::as_str),
            Some("1h")
        );
        assert_eq!(snapshot.status_reason.as_deref(), Some("Evicted"));
    }

    #[test]
    fn pod_snapshot_defaults() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("bare".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let snapshot = pod_snapshot(&pod, "fallback").unwrap();
        assert_eq!(snapshot.namespace, "fallback");
        assert!(snapshot.created_at.is_none());
        assert!(snapshot.annotations.is_empty());
        assert!(snapshot.status_reason.is_none());
    }

    #[test]
    fn unnamed_objects_are_dropped() {
        assert!(pod_snapshot(&Pod::default(), "default").is_none());
        assert!(node_snapshot(&Node::default()).is_none());
    }

    #[test]
    fn node_snapshot_copies_labels() {
        let node = Node {
            metadata: ObjectMeta {
                name: Some("ip-10-0-0-1".to_string()),
                labels: Some(BTreeMap::from([(
                    "node-lifecycle".to_string(),
                    "spot".to_string(),
                )])),
                ..Default::default()
            },
            ..Default::default()
        };

        let snapshot = node_snapshot(&node).unwrap();
        assert_eq!(snapshot.name, "ip-10-0-0-1");
        assert_eq!(snapshot.label_value("node-lifecycle"), Some("spot"));
    }

    #[test]
    fn upsert_adds_missing_taint() {
        let existing = vec![k8s_taint("dedicated", "gpu", "NoSchedule")];
        let taints = upsert_taint(&existing, &Taint::shutdown()).unwrap();

        assert_eq!(taints.len(), 2);
        assert_eq!(taints[0].key, "dedicated");
        assert_eq!(taints[1].key, "ci_node");
        assert_eq!(taints[1].value.as_deref(), Some("Disable"));
        assert_eq!(taints[1].effect, "NoSchedule");
    }

    #[test]
    fn upsert_is_noop_when_identical() {
        let existing = vec![k8s_taint("ci_node", "Disable", "NoSchedule")];
        assert!(upsert_taint(&existing, &Taint::shutdown()).is_none());
    }

    #[test]
    fn upsert_replaces_value_of_same_identity() {
        let existing = vec![
            k8s_taint("ci_node", "Enable", "NoSchedule"),
            k8s_taint("ci_node", "Disable", "NoExecute"),
        ];
        let taints = upsert_taint(&existing, &Taint::shutdown()).unwrap();

        assert_eq!(taints.len(), 2);
        assert_eq!(taints[0].effect, "NoExecute");
        assert_eq!(taints[1].value.as_deref(), Some("Disable"));
        assert_eq!(taints[1].effect, "NoSchedule");
    }
}
