//! Lifetime reconcilers for the pod reaper.
//!
//! This crate implements the reaper's policy logic on top of the
//! [`ClusterClient`](reaper_cluster::ClusterClient) and
//! [`MetricsSink`](reaper_core::MetricsSink) capabilities:
//!
//! - [`PodReaper`]: reaps pods past their annotated lifetime, bounded by a
//!   per-namespace budget, and optionally deletes kubelet-evicted pods
//! - [`NodeReaper`]: aggregates fleet composition per node group and taints
//!   spot nodes past the global age threshold
//! - [`TickDriver`]: runs both reconcilers once per tick, either in a loop or
//!   a single time
//!
//! # Failure policy
//!
//! Failures are handled per operation:
//!
//! | Failure | Handling |
//! |---|---|
//! | TTL delete/evict fails | logged, next pod |
//! | Taint call fails | logged, next node |
//! | Node listing fails | logged, treated as no nodes |
//! | Pod listing fails | [`ControlError::ListPods`], fatal |
//! | Evicted-pod delete fails | [`ControlError::EvictedCleanup`], fatal |
//!
//! Evicted-pod cleanup is stricter than the TTL path.
//! TODO: confirm whether a failed evicted-pod delete should stop the process
//! or be logged like a failed TTL reap.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

use std::time::Duration;

use chrono::{DateTime, Utc};

pub mod error;
pub mod nodes;
pub mod pods;
pub mod tick;

pub use error::{ControlError, Result};
pub use nodes::{NodeFleet, NodeGroup, NodeReaper, NodeReport, NodeSignals, NodeSkip};
pub use pods::{LifetimeVerdict, NamespaceStats, PodReaper, ReapStats};
pub use tick::{TickDriver, TickReport};

/// Age of an object created at `created` as seen at `now`.
///
/// Objects stamped in the future (clock skew) have zero age.
pub(crate) fn age_at(created: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - created).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn age_is_clamped_at_zero() {
        let now = Utc::now();
        assert_eq!(age_at(now - ChronoDuration::hours(2), now), Duration::from_secs(7200));
        assert_eq!(age_at(now + ChronoDuration::hours(1), now), Duration::ZERO);
    }
}
