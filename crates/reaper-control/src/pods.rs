//! Pod lifetime reconciler.
//!
//! Each call handles one namespace scope. Pods are visited in the order the
//! API server returns them; no ordering is imposed, so which expired pods are
//! reaped once the budget runs out is not deterministic across ticks.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use reaper_cluster::{ClusterClient, ClusterError, PodSnapshot};
use reaper_core::labels::{EVICTED_REASON, LIFETIME_ANNOTATION};
use reaper_core::{
    parse_duration, MetricsSink, NamespaceSelection, PodKind, ReapMethod, ReapPolicy,
};

use crate::age_at;
use crate::error::{ControlError, Result};

/// Per-namespace outcome of one reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapStats {
    /// Pods carrying the lifetime annotation.
    pub tracked: usize,
    /// Pods without the annotation.
    pub ignored: usize,
    /// Pods reaped for exceeding their lifetime.
    pub killed: usize,
    /// Kubelet-evicted pods deleted.
    pub evicted_cleaned: usize,
}

/// Stats for one namespace scope within a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceStats {
    /// Namespace name, or `all`.
    pub namespace: String,
    /// The reconciliation outcome.
    pub stats: ReapStats,
}

/// How a pod's lifetime annotation compares with its age.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifetimeVerdict {
    /// The annotation is unparsable or zero.
    Invalid,
    /// The pod has no creation time, so its age is unknown.
    Unknown,
    /// The pod is within its lifetime.
    Alive,
    /// The pod has outlived its lifetime. A negative lifetime is always
    /// outlived.
    Expired,
}

impl LifetimeVerdict {
    /// Judge a pod's age at `now` against a lifetime annotation value.
    #[must_use]
    pub fn evaluate(pod: &PodSnapshot, value: &str, now: DateTime<Utc>) -> Self {
        let lifetime = match parse_duration(value) {
            Ok(lifetime) if !lifetime.is_zero() => lifetime,
            _ => return Self::Invalid,
        };
        let Some(created) = pod.created_at else {
            return Self::Unknown;
        };
        if lifetime.is_exceeded_by(age_at(created, now)) {
            Self::Expired
        } else {
            Self::Alive
        }
    }
}

/// Reaps pods that outlived their lifetime annotation.
pub struct PodReaper<C, M> {
    cluster: Arc<C>,
    metrics: Arc<M>,
}

impl<C, M> PodReaper<C, M>
where
    C: ClusterClient,
    M: MetricsSink,
{
    /// Create a new pod reaper.
    #[must_use]
    pub fn new(cluster: Arc<C>, metrics: Arc<M>) -> Self {
        Self { cluster, metrics }
    }

    /// Reconcile every namespace in the selection, in order.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error; namespaces after it are not visited.
    pub async fn reconcile_selection(
        &self,
        policy: &ReapPolicy,
    ) -> Result<Vec<NamespaceStats>> {
        self.reconcile_selection_at(policy, Utc::now()).await
    }

    /// Like [`Self::reconcile_selection`], evaluating ages at `now`.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error; namespaces after it are not visited.
    pub async fn reconcile_selection_at(
        &self,
        policy: &ReapPolicy,
        now: DateTime<Utc>,
    ) -> Result<Vec<NamespaceStats>> {
        let scopes: Vec<Option<&str>> = match &policy.namespaces {
            NamespaceSelection::Disabled => {
                info!("No namespaces to monitor");
                return Ok(Vec::new());
            }
            NamespaceSelection::All => vec![None],
            NamespaceSelection::Named(names) => names.iter().map(|n| Some(n.as_str())).collect(),
        };

        let mut results = Vec::with_capacity(scopes.len());
        for scope in scopes {
            let stats = self.reconcile_namespace_at(scope, policy, now).await?;
            results.push(NamespaceStats {
                namespace: scope_label(scope).to_string(),
                stats,
            });
        }
        Ok(results)
    }

    /// Reconcile one namespace, or every namespace at once when `namespace`
    /// is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::ListPods`] if pods cannot be listed and
    /// [`ControlError::EvictedCleanup`] if an evicted pod cannot be deleted.
    pub async fn reconcile_namespace(
        &self,
        namespace: Option<&str>,
        policy: &ReapPolicy,
    ) -> Result<ReapStats> {
        self.reconcile_namespace_at(namespace, policy, Utc::now())
            .await
    }

    /// Like [`Self::reconcile_namespace`], evaluating ages at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::ListPods`] if pods cannot be listed and
    /// [`ControlError::EvictedCleanup`] if an evicted pod cannot be deleted.
    pub async fn reconcile_namespace_at(
        &self,
        namespace: Option<&str>,
        policy: &ReapPolicy,
        now: DateTime<Utc>,
    ) -> Result<ReapStats> {
        let label = scope_label(namespace);
        let pods = self
            .cluster
            .list_pods(namespace)
            .await
            .map_err(|source| ControlError::ListPods {
                namespace: label.to_string(),
                source,
            })?;

        info!(namespace = label, pods = pods.len(), "Checking pods");

        let mut stats = ReapStats::default();
        for pod in &pods {
            let mut reaped = false;
            match pod.annotations.get(LIFETIME_ANNOTATION) {
                Some(value) => {
                    stats.tracked += 1;
                    debug!(
                        namespace = %pod.namespace,
                        pod = %pod.name,
                        lifetime = %value,
                        "Found lifetime annotation"
                    );
                    reaped = self.reap_if_expired(pod, value, policy, stats.killed, now).await;
                    if reaped {
                        stats.killed += 1;
                    }
                }
                None => stats.ignored += 1,
            }

            // A pod reaped above is already gone.
            if !reaped && policy.reap_evicted && is_evicted(pod) {
                self.delete_evicted(pod).await?;
                stats.evicted_cleaned += 1;
            }
        }

        info!(
            namespace = label,
            tracked = stats.tracked,
            ignored = stats.ignored,
            killed = stats.killed,
            evicted_cleaned = stats.evicted_cleaned,
            "Reaped old and evicted pods"
        );
        self.publish(label, policy, &stats);

        Ok(stats)
    }

    /// Reap `pod` if it is expired and the budget allows. Returns true if the
    /// pod was reaped.
    async fn reap_if_expired(
        &self,
        pod: &PodSnapshot,
        value: &str,
        policy: &ReapPolicy,
        killed: usize,
        now: DateTime<Utc>,
    ) -> bool {
        match LifetimeVerdict::evaluate(pod, value, now) {
            LifetimeVerdict::Invalid => {
                debug!(pod = %pod.name, value, "Provided lifetime is incorrect");
                false
            }
            LifetimeVerdict::Unknown => {
                debug!(pod = %pod.name, "Pod has no creation time");
                false
            }
            LifetimeVerdict::Alive => false,
            LifetimeVerdict::Expired if killed >= policy.max_reap_count => {
                debug!(
                    pod = %pod.name,
                    max = policy.max_reap_count,
                    "Reap budget exhausted"
                );
                false
            }
            LifetimeVerdict::Expired => self.reap(pod, policy.evict).await,
        }
    }

    async fn reap(&self, pod: &PodSnapshot, evict: bool) -> bool {
        let result = if evict {
            info!(
                namespace = %pod.namespace,
                pod = %pod.name,
                "Pod is past its lifetime and will be evicted"
            );
            self.cluster.evict_pod(&pod.namespace, &pod.name).await
        } else {
            info!(
                namespace = %pod.namespace,
                pod = %pod.name,
                "Pod is past its lifetime and will be deleted"
            );
            self.cluster.delete_pod(&pod.namespace, &pod.name).await
        };

        match result {
            Ok(()) => {
                info!(namespace = %pod.namespace, pod = %pod.name, "Pod reaped");
                true
            }
            Err(e) => {
                log_reap_failure(pod, &e);
                false
            }
        }
    }

    async fn delete_evicted(&self, pod: &PodSnapshot) -> Result<()> {
        debug!(namespace = %pod.namespace, pod = %pod.name, "Pod is evicted and will be deleted");
        self.cluster
            .delete_pod(&pod.namespace, &pod.name)
            .await
            .map_err(|source| ControlError::EvictedCleanup {
                namespace: pod.namespace.clone(),
                name: pod.name.clone(),
                source,
            })?;
        info!(namespace = %pod.namespace, pod = %pod.name, "Evicted pod deleted");
        Ok(())
    }

    fn publish(&self, label: &str, policy: &ReapPolicy, stats: &ReapStats) {
        let ttl_method = if policy.evict {
            ReapMethod::Evicted
        } else {
            ReapMethod::Deleted
        };
        self.metrics.set_pods(label, PodKind::Tracking, stats.tracked as u64);
        self.metrics.set_pods(label, PodKind::Ignoring, stats.ignored as u64);
        self.metrics.add_reaped(label, ttl_method, stats.killed as u64);
        self.metrics.add_reaped(label, ReapMethod::Killed, stats.evicted_cleaned as u64);
    }
}

fn scope_label(namespace: Option<&str>) -> &str {
    namespace.unwrap_or(NamespaceSelection::ALL_LABEL)
}

fn is_evicted(pod: &PodSnapshot) -> bool {
    pod.status_reason
        .as_deref()
        .is_some_and(|reason| reason.contains(EVICTED_REASON))
}

fn log_reap_failure(pod: &PodSnapshot, error: &ClusterError) {
    warn!(
        namespace = %pod.namespace,
        pod = %pod.name,
        error = %error,
        retriable = error.is_retriable(),
        "Unable to reap pod"
    );
}
