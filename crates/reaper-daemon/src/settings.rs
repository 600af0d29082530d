//! Command-line and environment settings.
//!
//! Every setting can be given as a flag or through the environment variable
//! named next to it. Settings are turned into a validated
//! [`ReaperConfig`] once at startup.
//!
//! Boolean settings accept `true`/`false`, `1`/`0` and `t`/`f` in any case,
//! and a bare flag means `true`.

use std::path::PathBuf;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};

use reaper_core::{
    ConfigError, NamespaceSelection, NodePolicy, ReapPolicy, ReaperConfig, RunMode,
};

/// Reaps pods past their lifetime annotation and taints aged spot nodes.
#[derive(Parser, Debug, Clone)]
#[command(name = "pod-reaper")]
#[command(author, version, about, long_about = None)]
pub struct Settings {
    /// Kubeconfig file. Defaults to in-cluster or local kubeconfig inference.
    #[arg(long, env = "KUBECONFIG_PATH")]
    pub kubeconfig: Option<PathBuf>,

    /// HTTP listen address for liveness and metrics.
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// Maximum number of pods reaped per namespace per tick.
    #[arg(
        long,
        env = "MAX_REAPER_COUNT_PER_RUN",
        default_value_t = ReapPolicy::DEFAULT_MAX_REAP_COUNT
    )]
    pub max_reap_count: usize,

    /// Comma-separated namespaces to watch, or `all`. Empty disables pod reaping.
    #[arg(long, env = "REAPER_NAMESPACES", default_value = "")]
    pub namespaces: String,

    /// Evict expired pods instead of deleting them.
    #[arg(
        long,
        env = "EVICT",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        num_args = 0..=1,
        default_missing_value = "true",
        default_value_t = false
    )]
    pub evict: bool,

    /// Delete pods the kubelet has already evicted.
    #[arg(
        long,
        env = "REAP_EVICTED_PODS",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        num_args = 0..=1,
        default_missing_value = "true",
        default_value_t = false
    )]
    pub reap_evicted: bool,

    /// Age after which spot nodes are tainted (e.g. `72h`). Unset disables it.
    #[arg(long, env = "NODE_LIFE_TIME")]
    pub node_lifetime: Option<String>,

    /// Seconds to sleep between ticks.
    #[arg(long, env = "REAPER_INTERVAL_IN_SEC", default_value_t = 60)]
    pub interval_secs: u64,

    /// Run a single tick and exit.
    #[arg(
        long,
        env = "CRON_JOB",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        num_args = 0..=1,
        default_missing_value = "true",
        default_value_t = false
    )]
    pub cron_job: bool,
}

impl Settings {
    /// Build and validate the reaper configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace list has blank entries, the node
    /// lifetime does not parse, or the interval is zero in daemon mode.
    pub fn to_config(&self) -> Result<ReaperConfig, ConfigError> {
        let node_lifetime = self
            .node_lifetime
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty());

        ReaperConfig {
            reap: ReapPolicy {
                max_reap_count: self.max_reap_count,
                evict: self.evict,
                reap_evicted: self.reap_evicted,
                namespaces: NamespaceSelection::parse(&self.namespaces)?,
            },
            nodes: NodePolicy {
                max_age: node_lifetime.map(str::to_string),
            },
            interval: Duration::from_secs(self.interval_secs),
            run_mode: if self.cron_job {
                RunMode::Once
            } else {
                RunMode::Daemon
            },
        }
        .validate()
    }
}
