//! Kubernetes cluster access for the pod reaper.
//!
//! This crate provides the [`ClusterClient`] trait and the [`KubeCluster`]
//! implementation the reconcilers use to observe and mutate the cluster. It
//! covers exactly the capabilities the reaper needs:
//!
//! - Listing pods in one namespace or across the whole cluster
//! - Listing nodes
//! - Deleting and evicting pods
//! - Adding or updating a taint on a node
//!
//! Kubernetes objects are flattened into [`PodSnapshot`] and [`NodeSnapshot`]
//! so the policy code never deals with optional API fields.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 PodReaper / NodeReaper                           │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 ClusterClient (KubeCluster)                      │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────────┐   │
//! │  │  List       │ │  Delete /   │ │    Taint upsert         │   │
//! │  │  pods/nodes │ │  Evict      │ │                         │   │
//! │  └─────────────┘ └─────────────┘ └─────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Kubernetes API Server                         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Testing
//!
//! For testing without a real Kubernetes cluster, enable the `test-utils`
//! feature and use the mock cluster:
//!
//! ```ignore
//! use reaper_cluster::{ClusterClient, MockCluster, PodSnapshot};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cluster = MockCluster::new();
//! cluster.add_pod(PodSnapshot::new("default", "web-0"));
//!
//! cluster.delete_pod("default", "web-0").await?;
//! assert_eq!(cluster.pod_count(), 0);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod convert;
pub mod error;
pub mod k8s;
pub mod types;

pub use error::{ClusterError, Result};
pub use k8s::{ClusterClient, KubeCluster};
pub use types::{NodeSnapshot, PodSnapshot, Taint, TaintEffect, TaintOutcome};

#[cfg(any(test, feature = "test-utils"))]
pub use k8s::mock::{ClusterCall, MockCluster};
