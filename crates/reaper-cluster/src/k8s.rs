//! Kubernetes cluster client implementation.
//!
//! This module provides the `KubeCluster` which reads pods and nodes and
//! performs the reaper's mutations against a live Kubernetes API server.

use std::future::Future;
use std::path::Path;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, DeleteParams, EvictParams, ListParams, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::convert::{node_snapshot, pod_snapshot, upsert_taint};
use crate::types::{NodeSnapshot, PodSnapshot, Taint, TaintOutcome};
use crate::{ClusterError, Result};

/// The `ClusterClient` trait defines the cluster capabilities the reconcilers consume.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// List pods in a namespace, or in every namespace when `namespace` is `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails.
    async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<PodSnapshot>>;

    /// List all nodes in the cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails.
    async fn list_nodes(&self) -> Result<Vec<NodeSnapshot>>;

    /// Delete a pod. A pod that no longer exists counts as deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion is rejected.
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()>;

    /// Evict a pod through the eviction subresource, honouring disruption budgets.
    /// A pod that no longer exists counts as evicted.
    ///
    /// # Errors
    ///
    /// Returns an error if the eviction is rejected (e.g. blocked by a budget).
    async fn evict_pod(&self, namespace: &str, name: &str) -> Result<()>;

    /// Add `taint` to a node, or update the value of a taint with the same key
    /// and effect.
    ///
    /// # Errors
    ///
    /// Returns an error if the node cannot be read or patched.
    async fn taint_node(&self, node: &str, taint: &Taint) -> Result<TaintOutcome>;
}

/// Attempts made to write a taint before a write conflict is returned.
const TAINT_ATTEMPTS: usize = 3;

/// Run `attempt` again while it fails with a write conflict, up to
/// [`TAINT_ATTEMPTS`] times.
async fn retry_on_conflict<T, F, Fut>(node: &str, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut tries = 1;
    loop {
        match attempt().await {
            Err(e) if e.is_conflict() && tries < TAINT_ATTEMPTS => {
                warn!(node, attempt = tries, "Node changed while tainting, retrying");
                tries += 1;
            }
            other => return other,
        }
    }
}

/// Kubernetes-backed cluster client.
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Create a client from the ambient configuration.
    ///
    /// This uses the in-cluster service account when running inside a pod and
    /// falls back to the local kubeconfig otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the Kubernetes client cannot be created.
    pub async fn new() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self { client })
    }

    /// Create a client from an explicit kubeconfig file, using its current context.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the client cannot be built.
    pub async fn from_kubeconfig(path: &Path) -> Result<Self> {
        let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
            ClusterError::Config(format!("Failed to read kubeconfig {}: {e}", path.display()))
        })?;
        let config =
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| ClusterError::Config(format!("Invalid kubeconfig: {e}")))?;
        let client = Client::try_from(config)?;

        info!(path = %path.display(), "Loaded kubeconfig");
        Ok(Self { client })
    }

    /// Create a cluster client around a pre-configured client.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn pods_api(&self, namespace: Option<&str>) -> Api<Pod> {
        match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    fn nodes_api(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }

    /// Read the node and write the merged taints in one attempt.
    ///
    /// The patch carries the resource version that was read, so a concurrent
    /// update of the node fails with 409 instead of being overwritten.
    async fn write_taint(&self, node: &str, taint: &Taint) -> Result<TaintOutcome> {
        let nodes = self.nodes_api();
        let Some(current) = nodes.get_opt(node).await? else {
            return Err(ClusterError::NodeNotFound(node.to_string()));
        };

        let existing = current
            .spec
            .as_ref()
            .and_then(|s| s.taints.clone())
            .unwrap_or_default();

        let Some(taints) = upsert_taint(&existing, taint) else {
            debug!(node, taint = %taint, "Taint already present");
            return Ok(TaintOutcome::Unchanged);
        };

        let patch = json!({
            "metadata": { "resourceVersion": current.metadata.resource_version },
            "spec": { "taints": taints },
        });
        nodes
            .patch(node, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;

        Ok(TaintOutcome::Applied)
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<PodSnapshot>> {
        let pod_list = self
            .pods_api(namespace)
            .list(&ListParams::default())
            .await?;

        let fallback = namespace.unwrap_or_default();
        Ok(pod_list
            .items
            .iter()
            .filter_map(|pod| pod_snapshot(pod, fallback))
            .collect())
    }

    async fn list_nodes(&self) -> Result<Vec<NodeSnapshot>> {
        let node_list = self.nodes_api().list(&ListParams::default()).await?;
        Ok(node_list.items.iter().filter_map(node_snapshot).collect())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        match self
            .pods_api(Some(namespace))
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => {
                warn!(namespace, pod = name, "Pod not found, already deleted");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn evict_pod(&self, namespace: &str, name: &str) -> Result<()> {
        match self
            .pods_api(Some(namespace))
            .evict(name, &EvictParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => {
                warn!(namespace, pod = name, "Pod not found, already evicted");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn taint_node(&self, node: &str, taint: &Taint) -> Result<TaintOutcome> {
        retry_on_conflict(node, || self.write_taint(node, taint)).await
    }
}

/// A mock cluster for testing without a real Kubernetes cluster.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use kube::core::ErrorResponse;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};

    /// A call made against the mock cluster.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ClusterCall {
        /// `list_pods` with the requested namespace.
        ListPods(Option<String>),
        /// `list_nodes`.
        ListNodes,
        /// `delete_pod`.
        DeletePod {
            /// Pod namespace.
            namespace: String,
            /// Pod name.
            name: String,
        },
        /// `evict_pod`.
        EvictPod {
            /// Pod namespace.
            namespace: String,
            /// Pod name.
            name: String,
        },
        /// `taint_node`.
        TaintNode {
            /// Node name.
            node: String,
            /// Requested taint.
            taint: Taint,
        },
    }

    struct MockNode {
        snapshot: NodeSnapshot,
        taints: Vec<Taint>,
    }

    /// A mock cluster that stores pods and nodes in memory.
    ///
    /// Deleted and evicted pods disappear from subsequent listings.
    #[derive(Default)]
    pub struct MockCluster {
        pods: Mutex<Vec<PodSnapshot>>,
        nodes: Mutex<Vec<MockNode>>,
        calls: Mutex<Vec<ClusterCall>>,
        failing_pods: Mutex<HashSet<(String, String)>>,
        failing_nodes: Mutex<HashSet<String>>,
        conflicting_nodes: Mutex<HashMap<String, usize>>,
        fail_pod_list: Mutex<bool>,
        fail_node_list: Mutex<bool>,
    }

    impl MockCluster {
        /// Create an empty mock cluster.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Add a pod.
        pub fn add_pod(&self, pod: PodSnapshot) {
            self.pods.lock().push(pod);
        }

        /// Add a node without taints.
        pub fn add_node(&self, node: NodeSnapshot) {
            self.nodes.lock().push(MockNode {
                snapshot: node,
                taints: Vec::new(),
            });
        }

        /// Make every mutation on this pod fail.
        pub fn fail_pod(&self, namespace: &str, name: &str) {
            self.failing_pods
                .lock()
                .insert((namespace.to_string(), name.to_string()));
        }

        /// Make taint calls on this node fail.
        pub fn fail_node(&self, name: &str) {
            self.failing_nodes.lock().insert(name.to_string());
        }

        /// Make the next `times` taint writes on this node fail with a write
        /// conflict, as if the node changed after it was read.
        pub fn conflict_node(&self, name: &str, times: usize) {
            self.conflicting_nodes.lock().insert(name.to_string(), times);
        }

        /// Make `list_pods` fail.
        pub fn fail_pod_listing(&self) {
            *self.fail_pod_list.lock() = true;
        }

        /// Make `list_nodes` fail.
        pub fn fail_node_listing(&self) {
            *self.fail_node_list.lock() = true;
        }

        /// Number of pods still present.
        #[must_use]
        pub fn pod_count(&self) -> usize {
            self.pods.lock().len()
        }

        /// Names of pods still present in a namespace.
        #[must_use]
        pub fn pod_names(&self, namespace: &str) -> Vec<String> {
            self.pods
                .lock()
                .iter()
                .filter(|p| p.namespace == namespace)
                .map(|p| p.name.clone())
                .collect()
        }

        /// Every call made so far, in order.
        #[must_use]
        pub fn calls(&self) -> Vec<ClusterCall> {
            self.calls.lock().clone()
        }

        /// Number of delete and evict calls made so far.
        #[must_use]
        pub fn mutation_count(&self) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|c| {
                    matches!(c, ClusterCall::DeletePod { .. } | ClusterCall::EvictPod { .. })
                })
                .count()
        }

        /// Names of nodes a taint call was made for.
        #[must_use]
        pub fn tainted_nodes(&self) -> Vec<String> {
            self.calls
                .lock()
                .iter()
                .filter_map(|c| match c {
                    ClusterCall::TaintNode { node, .. } => Some(node.clone()),
                    _ => None,
                })
                .collect()
        }

        /// Current taints on a node.
        #[must_use]
        pub fn node_taints(&self, name: &str) -> Vec<Taint> {
            self.nodes
                .lock()
                .iter()
                .find(|n| n.snapshot.name == name)
                .map(|n| n.taints.clone())
                .unwrap_or_default()
        }

        fn record(&self, call: ClusterCall) {
            self.calls.lock().push(call);
        }

        fn write_taint(&self, node: &str, taint: &Taint) -> Result<TaintOutcome> {
            if let Some(pending) = self.conflicting_nodes.lock().get_mut(node) {
                if *pending > 0 {
                    *pending -= 1;
                    return Err(ClusterError::KubeApi(kube::Error::Api(ErrorResponse {
                        status: "Failure".to_string(),
                        message: format!("Operation cannot be fulfilled on nodes \"{node}\""),
                        reason: "Conflict".to_string(),
                        code: 409,
                    })));
                }
            }

            let mut nodes = self.nodes.lock();
            let Some(entry) = nodes.iter_mut().find(|n| n.snapshot.name == node) else {
                return Err(ClusterError::NodeNotFound(node.to_string()));
            };

            if entry.taints.contains(taint) {
                return Ok(TaintOutcome::Unchanged);
            }
            entry
                .taints
                .retain(|t| !(t.key == taint.key && t.effect == taint.effect));
            entry.taints.push(taint.clone());
            Ok(TaintOutcome::Applied)
        }

        fn remove_pod(&self, namespace: &str, name: &str) -> Result<()> {
            if self
                .failing_pods
                .lock()
                .contains(&(namespace.to_string(), name.to_string()))
            {
                return Err(ClusterError::Injected(format!("{namespace}/{name}")));
            }
            self.pods
                .lock()
                .retain(|p| !(p.namespace == namespace && p.name == name));
            Ok(())
        }
    }

    #[async_trait]
    impl ClusterClient for MockCluster {
        async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<PodSnapshot>> {
            self.record(ClusterCall::ListPods(namespace.map(str::to_string)));
            if *self.fail_pod_list.lock() {
                return Err(ClusterError::Injected("pod listing".to_string()));
            }
            Ok(self
                .pods
                .lock()
                .iter()
                .filter(|p| namespace.map_or(true, |ns| p.namespace == ns))
                .cloned()
                .collect())
        }

        async fn list_nodes(&self) -> Result<Vec<NodeSnapshot>> {
            self.record(ClusterCall::ListNodes);
            if *self.fail_node_list.lock() {
                return Err(ClusterError::Injected("node listing".to_string()));
            }
            Ok(self
                .nodes
                .lock()
                .iter()
                .map(|n| n.snapshot.clone())
                .collect())
        }

        async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
            self.record(ClusterCall::DeletePod {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
            self.remove_pod(namespace, name)
        }

        async fn evict_pod(&self, namespace: &str, name: &str) -> Result<()> {
            self.record(ClusterCall::EvictPod {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
            self.remove_pod(namespace, name)
        }

        async fn taint_node(&self, node: &str, taint: &Taint) -> Result<TaintOutcome> {
            self.record(ClusterCall::TaintNode {
                node: node.to_string(),
                taint: taint.clone(),
            });
            if self.failing_nodes.lock().contains(node) {
                return Err(ClusterError::Injected(node.to_string()));
            }
            retry_on_conflict(node, || async { self.write_taint(node, taint) }).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{ClusterCall, MockCluster};
    use super::*;
    use crate::types::TaintEffect;

    #[tokio::test]
    async fn mock_lists_by_namespace() {
        let cluster = MockCluster::new();
        cluster.add_pod(PodSnapshot::new("default", "a"));
        cluster.add_pod(PodSnapshot::new("ci", "b"));

        assert_eq!(cluster.list_pods(Some("default")).await.unwrap().len(), 1);
        assert_eq!(cluster.list_pods(None).await.unwrap().len(), 2);
        assert_eq!(
            cluster.calls(),
            vec![
                ClusterCall::ListPods(Some("default".to_string())),
                ClusterCall::ListPods(None),
            ]
        );
    }

    #[tokio::test]
    async fn mock_delete_and_evict_remove_pods() {
        let cluster = MockCluster::new();
        cluster.add_pod(PodSnapshot::new("default", "a"));
        cluster.add_pod(PodSnapshot::new("default", "b"));

        cluster.delete_pod("default", "a").await.unwrap();
        cluster.evict_pod("default", "b").await.unwrap();
        assert_eq!(cluster.pod_count(), 0);
        assert_eq!(cluster.mutation_count(), 2);

        // Already gone
        cluster.delete_pod("default", "a").await.unwrap();
    }

    #[tokio::test]
    async fn mock_injected_failures() {
        let cluster = MockCluster::new();
        cluster.add_pod(PodSnapshot::new("default", "a"));
        cluster.fail_pod("default", "a");

        assert!(cluster.delete_pod("default", "a").await.is_err());
        assert_eq!(cluster.pod_names("default"), vec!["a".to_string()]);

        cluster.fail_pod_listing();
        assert!(cluster.list_pods(None).await.is_err());

        cluster.fail_node_listing();
        assert!(cluster.list_nodes().await.is_err());
    }

    #[tokio::test]
    async fn mock_taint_is_idempotent() {
        let cluster = MockCluster::new();
        cluster.add_node(NodeSnapshot::new("n1"));
        let taint = Taint::shutdown();

        assert_eq!(
            cluster.taint_node("n1", &taint).await.unwrap(),
            TaintOutcome::Applied
        );
        assert_eq!(
            cluster.taint_node("n1", &taint).await.unwrap(),
            TaintOutcome::Unchanged
        );
        assert_eq!(cluster.node_taints("n1"), vec![taint.clone()]);

        let updated = Taint {
            value: "Enable".to_string(),
            ..taint
        };
        cluster.taint_node("n1", &updated).await.unwrap();
        assert_eq!(cluster.node_taints("n1"), vec![updated]);
        assert_eq!(cluster.node_taints("n1")[0].effect, TaintEffect::NoSchedule);
    }

    #[tokio::test]
    async fn mock_taint_missing_node() {
        let cluster = MockCluster::new();
        let err = cluster.taint_node("ghost", &Taint::shutdown()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn taint_retries_after_write_conflict() {
        let cluster = MockCluster::new();
        cluster.add_node(NodeSnapshot::new("n1"));
        cluster.conflict_node("n1", TAINT_ATTEMPTS - 1);

        let outcome = cluster.taint_node("n1", &Taint::shutdown()).await.unwrap();

        assert_eq!(outcome, TaintOutcome::Applied);
        assert_eq!(cluster.node_taints("n1"), vec![Taint::shutdown()]);
    }

    #[tokio::test]
    async fn taint_gives_up_on_persistent_conflict() {
        let cluster = MockCluster::new();
        cluster.add_node(NodeSnapshot::new("n1"));
        cluster.conflict_node("n1", TAINT_ATTEMPTS);

        let err = cluster.taint_node("n1", &Taint::shutdown()).await.unwrap_err();

        assert!(err.is_conflict());
        assert!(cluster.node_taints("n1").is_empty());

        // The conflicts are used up, so the next tick gets through.
        assert_eq!(
            cluster.taint_node("n1", &Taint::shutdown()).await.unwrap(),
            TaintOutcome::Applied
        );
    }
}
