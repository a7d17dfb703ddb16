//! Core type definitions for gputop

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Label prefix carrying one role per key, e.g. `node-role.kubernetes.io/master`
pub const NODE_ROLE_LABEL_PREFIX: &str = "node-role.kubernetes.io/";

/// Legacy single-valued role label
pub const LEGACY_NODE_ROLE_LABEL: &str = "kubernetes.io/role";

/// Role names derived from a node's labels
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRole(String);

impl NodeRole {
    /// Create a new role from its name
    pub fn new(role: impl Into<String>) -> Self {
        Self(role.into())
    }

    /// Get the role name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Collect the roles declared by a node's labels, sorted and deduplicated
    pub fn from_labels(labels: &BTreeMap<String, String>) -> Vec<NodeRole> {
        let mut roles: Vec<NodeRole> = labels
            .iter()
            .filter_map(|(key, value)| {
                if let Some(role) = key.strip_prefix(NODE_ROLE_LABEL_PREFIX) {
                    (!role.is_empty()).then(|| NodeRole::new(role))
                } else if key == LEGACY_NODE_ROLE_LABEL && !value.is_empty() {
                    Some(NodeRole::new(value.as_str()))
                } else {
                    None
                }
            })
            .collect();
        roles.sort();
        roles.dedup();
        roles
    }

    /// Join roles for display, `<none>` when empty
    pub fn join(roles: &[NodeRole]) -> String {
        if roles.is_empty() {
            return "<none>".to_string();
        }
        roles
            .iter()
            .map(NodeRole::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Readiness of a node as reported by the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Ready,
    NotReady,
}

impl NodeStatus {
    pub fn from_ready(ready: bool) -> Self {
        if ready {
            NodeStatus::Ready
        } else {
            NodeStatus::NotReady
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Ready => write!(f, "Ready"),
            NodeStatus::NotReady => write!(f, "NotReady"),
        }
    }
}

/// Lifecycle phase of a pod
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PodPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    /// Succeeded and failed pods no longer hold devices
    pub fn is_terminal(&self) -> bool {
        matches!(self, PodPhase::Succeeded | PodPhase::Failed)
    }
}

impl std::str::FromStr for PodPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(PodPhase::Pending),
            "running" => Ok(PodPhase::Running),
            "succeeded" => Ok(PodPhase::Succeeded),
            "failed" => Ok(PodPhase::Failed),
            "unknown" => Ok(PodPhase::Unknown),
            _ => Err(format!("Unknown pod phase: {}", s)),
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PodPhase::Pending => write!(f, "Pending"),
            PodPhase::Running => write!(f, "Running"),
            PodPhase::Succeeded => write!(f, "Succeeded"),
            PodPhase::Failed => write!(f, "Failed"),
            PodPhase::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Resource model a node exposes its GPUs under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GpuMode {
    /// Devices are shared by memory and compute fraction
    Share,
    /// Devices are handed out whole
    Exclusive,
    /// Whole devices picked by the topology-aware scheduler
    Topology,
    /// No schedulable GPUs
    None,
}

impl fmt::Display for GpuMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuMode::Share => write!(f, "share"),
            GpuMode::Exclusive => write!(f, "exclusive"),
            GpuMode::Topology => write!(f, "topology"),
            GpuMode::None => write!(f, "none"),
        }
    }
}

/// Restricts which pods a `ListPods` call returns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodScope {
    /// Only pods in this namespace
    pub namespace: Option<String>,

    /// Only pods bound to this node
    pub node: Option<String>,
}

impl PodScope {
    /// All pods in all namespaces
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    /// Check whether a pod's namespace and node fall inside this scope
    pub fn matches(&self, namespace: &str, node_name: Option<&str>) -> bool {
        if let Some(ref ns) = self.namespace {
            if ns != namespace {
                return false;
            }
        }
        if let Some(ref node) = self.node {
            if node_name != Some(node.as_str()) {
                return false;
            }
        }
        true
    }
}
