//! Reaper configuration types.
//!
//! The configuration is resolved once at startup from flags and environment
//! variables, validated eagerly, and then shared read-only with the
//! reconcilers for the lifetime of the process.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;
use crate::error::{ConfigError, Result};

/// Which namespaces the pod reconciler visits each tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "mode", content = "names")]
pub enum NamespaceSelection {
    /// Pod reaping is disabled.
    #[default]
    Disabled,
    /// Every namespace in the cluster, listed in one call.
    All,
    /// An explicit list of namespaces, visited in order.
    Named(Vec<String>),
}

impl NamespaceSelection {
    /// Label used for the "all namespaces" scope in logs and metrics.
    pub const ALL_LABEL: &'static str = "all";

    /// Parse a comma separated namespace list.
    ///
    /// An empty string disables pod reaping; a single `all` entry (any case)
    /// selects every namespace.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyNamespace`] if the list contains a blank entry.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::Disabled);
        }

        let names: Vec<String> = raw.split(',').map(|n| n.trim().to_string()).collect();
        if names.iter().any(String::is_empty) {
            return Err(ConfigError::EmptyNamespace(raw.to_string()));
        }

        if names.len() == 1 && names[0].eq_ignore_ascii_case(Self::ALL_LABEL) {
            return Ok(Self::All);
        }

        Ok(Self::Named(names))
    }

    /// Returns true if no namespace is selected.
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }
}

/// Policy for the pod lifetime reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReapPolicy {
    /// Maximum TTL reaps per namespace per tick.
    ///
    /// Evicted-pod cleanup is not bounded by this value.
    pub max_reap_count: usize,
    /// Evict pods through the eviction API instead of deleting them.
    pub evict: bool,
    /// Delete pods whose status reason marks them as evicted.
    pub reap_evicted: bool,
    /// Namespaces to visit.
    pub namespaces: NamespaceSelection,
}

impl ReapPolicy {
    /// Default reap budget per namespace per tick.
    pub const DEFAULT_MAX_REAP_COUNT: usize = 30;
}

impl Default for ReapPolicy {
    fn default() -> Self {
        Self {
            max_reap_count: Self::DEFAULT_MAX_REAP_COUNT,
            evict: false,
            reap_evicted: false,
            namespaces: NamespaceSelection::Disabled,
        }
    }
}

/// Policy for the node lifetime reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePolicy {
    /// Global node age threshold as a duration string. `None` disables node
    /// reconciliation.
    pub max_age: Option<String>,
}

impl NodePolicy {
    /// Create a policy with the given threshold.
    #[must_use]
    pub fn with_max_age(max_age: impl Into<String>) -> Self {
        Self {
            max_age: Some(max_age.into()),
        }
    }
}

/// How the tick driver schedules ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Loop forever, sleeping the configured interval between ticks.
    #[default]
    Daemon,
    /// Run a single tick and exit (cron job).
    Once,
}

/// Fully resolved reaper configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaperConfig {
    /// Pod reaping policy.
    pub reap: ReapPolicy,
    /// Node tainting policy.
    pub nodes: NodePolicy,
    /// Sleep between ticks in daemon mode.
    pub interval: Duration,
    /// Daemon or one-shot.
    pub run_mode: RunMode,
}

impl ReaperConfig {
    /// Default sleep between ticks.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the node lifetime is set but unparsable, or if the
    /// interval is zero in daemon mode.
    pub fn validate(self) -> Result<Self> {
        if let Some(value) = &self.nodes.max_age {
            parse_duration(value).map_err(|source| ConfigError::InvalidNodeLifetime {
                value: value.clone(),
                source,
            })?;
        }
        if self.run_mode == RunMode::Daemon && self.interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(self)
    }
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            reap: ReapPolicy::default(),
            nodes: NodePolicy::default(),
            interval: Self::DEFAULT_INTERVAL,
            run_mode: RunMode::Daemon,
        }
    }
}
