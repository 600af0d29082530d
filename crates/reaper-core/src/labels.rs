//! Annotation, label and taint identifiers the reaper acts on.

/// Pod annotation declaring the maximum permitted age as a duration string.
pub const LIFETIME_ANNOTATION: &str = "pod.kubernetes.io/lifetime";

/// Substring of a pod's status reason marking it as evicted by the kubelet.
pub const EVICTED_REASON: &str = "Evicted";

/// Node label carrying the provisioning class.
pub const NODE_LIFECYCLE_LABEL: &str = "node-lifecycle";

/// Value of [`NODE_LIFECYCLE_LABEL`] for interruptible capacity.
pub const SPOT_LIFECYCLE: &str = "spot";

/// Node label naming the fleet group (eksctl node group).
pub const NODE_GROUP_LABEL: &str = "alpha.eksctl.io/nodegroup-name";

/// Key of the shutdown taint applied to aged spot nodes.
pub const SHUTDOWN_TAINT_KEY: &str = "ci_node";

/// Value of the shutdown taint.
pub const SHUTDOWN_TAINT_VALUE: &str = "Disable";

/// Node label value mirroring the shutdown taint (`ci_node=Disable:NoSchedule`).
///
/// Provisioning tooling sets this label alongside the taint; it is used as a
/// proxy for "already tainted" when aggregating fleet metrics.
pub const SHUTDOWN_TAINT_LABEL_VALUE: &str = "Disable:NoSchedule";
