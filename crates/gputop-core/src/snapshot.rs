//! Cluster snapshot: the immutable node and pod inventory one accounting
//! pass runs over.
//!
//! Quantities are plain `f64` scalars keyed by resource name, exactly as the
//! cluster reports them. Interpretation (which resource means what, which
//! unit a memory figure is in) is left to the accounting engine.

use crate::{GpuMode, NodeRole, NodeStatus, PodPhase, ResourceNames, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

fn default_true() -> bool {
    true
}

fn default_namespace() -> String {
    "default".to_string()
}

/// Look up the first resource in `names` present in `quantities`
fn first_quantity(quantities: &BTreeMap<String, f64>, names: &[String]) -> Option<f64> {
    names.iter().find_map(|name| quantities.get(name).copied())
}

/// Shared device count in one quantity map, falling back to compute / 100
fn share_count_in(quantities: &BTreeMap<String, f64>, names: &ResourceNames) -> u32 {
    match first_quantity(quantities, &names.share_count) {
        Some(count) if count > 0.0 => count as u32,
        _ => first_quantity(quantities, &names.share_compute)
            .map(|compute| (compute / 100.0).max(0.0) as u32)
            .unwrap_or(0),
    }
}

fn whole_count(quantity: f64) -> u32 {
    quantity.max(0.0) as u32
}

/// Telemetry of one device, sampled alongside the snapshot
///
/// Memory figures are in the same unit as the node's GPU memory resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceMetric {
    /// Device index on the node
    pub index: u32,

    #[serde(default)]
    pub total_memory: f64,

    #[serde(default)]
    pub used_memory: f64,

    /// Busy percentage over the sampling window
    #[serde(default)]
    pub duty_cycle: f64,
}

impl DeviceMetric {
    pub fn new(index: u32, total_memory: f64, used_memory: f64, duty_cycle: f64) -> Self {
        Self {
            index,
            total_memory,
            used_memory,
            duty_cycle,
        }
    }
}

/// A cluster node as seen at snapshot time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node name, unique within the cluster
    pub name: String,

    /// Internal IP address
    #[serde(default)]
    pub address: Option<String>,

    /// Node labels
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Whether the node reports Ready
    #[serde(default = "default_true")]
    pub ready: bool,

    /// Total resources on the node
    #[serde(default)]
    pub capacity: BTreeMap<String, f64>,

    /// Resources available for scheduling
    #[serde(default)]
    pub allocatable: BTreeMap<String, f64>,

    /// Per-device health flags, indexed by device index
    #[serde(default)]
    pub device_health: Vec<bool>,

    /// Per-device telemetry, empty when none was collected
    #[serde(default)]
    pub gpu_metrics: Vec<DeviceMetric>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: None,
            labels: BTreeMap::new(),
            ready: true,
            capacity: BTreeMap::new(),
            allocatable: BTreeMap::new(),
            device_health: Vec::new(),
            gpu_metrics: Vec::new(),
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_ready(mut self, ready: bool) -> Self {
        self.ready = ready;
        self
    }

    /// Set both capacity and allocatable for a resource
    pub fn with_resource(mut self, name: impl Into<String>, quantity: f64) -> Self {
        let name = name.into();
        self.capacity.insert(name.clone(), quantity);
        self.allocatable.insert(name, quantity);
        self
    }

    pub fn with_capacity(mut self, name: impl Into<String>, quantity: f64) -> Self {
        self.capacity.insert(name.into(), quantity);
        self
    }

    pub fn with_allocatable(mut self, name: impl Into<String>, quantity: f64) -> Self {
        self.allocatable.insert(name.into(), quantity);
        self
    }

    pub fn with_device_health(mut self, health: Vec<bool>) -> Self {
        self.device_health = health;
        self
    }

    pub fn with_gpu_metric(mut self, metric: DeviceMetric) -> Self {
        self.gpu_metrics.push(metric);
        self
    }

    pub fn roles(&self) -> Vec<NodeRole> {
        NodeRole::from_labels(&self.labels)
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus::from_ready(self.ready)
    }

    /// Address for display, `unknown` when the node reports none
    pub fn display_address(&self) -> &str {
        self.address.as_deref().unwrap_or("unknown")
    }

    /// Number of shareable devices
    ///
    /// Falls back to the allocatable compute percentage divided by 100 for
    /// plugins that only advertise compute.
    pub fn share_device_count(&self, names: &ResourceNames) -> u32 {
        share_count_in(&self.allocatable, names)
    }

    /// Shareable devices the node has in total, healthy or not
    pub fn share_device_capacity(&self, names: &ResourceNames) -> u32 {
        share_count_in(&self.capacity, names)
    }

    /// Allocatable shared memory, in whatever unit the plugin reports
    pub fn share_memory(&self, names: &ResourceNames) -> f64 {
        self.share_memory_allocatable(names).unwrap_or(0.0)
    }

    pub fn share_memory_allocatable(&self, names: &ResourceNames) -> Option<f64> {
        first_quantity(&self.allocatable, &names.share_memory)
    }

    pub fn share_memory_capacity(&self, names: &ResourceNames) -> Option<f64> {
        first_quantity(&self.capacity, &names.share_memory)
    }

    /// Total shared compute percentage, 0 when the node advertises none
    pub fn share_compute_capacity(&self, names: &ResourceNames) -> f64 {
        first_quantity(&self.capacity, &names.share_compute)
            .unwrap_or(0.0)
            .max(0.0)
    }

    pub fn exclusive_capacity(&self, names: &ResourceNames) -> u32 {
        whole_count(self.capacity.get(&names.exclusive_gpu).copied().unwrap_or(0.0))
    }

    /// `None` when the node does not report the resource as allocatable
    pub fn exclusive_allocatable(&self, names: &ResourceNames) -> Option<u32> {
        self.allocatable.get(&names.exclusive_gpu).copied().map(whole_count)
    }

    pub fn topology_capacity(&self, names: &ResourceNames) -> u32 {
        whole_count(self.capacity.get(&names.topology_gpu).copied().unwrap_or(0.0))
    }

    pub fn topology_allocatable(&self, names: &ResourceNames) -> Option<u32> {
        self.allocatable.get(&names.topology_gpu).copied().map(whole_count)
    }

    pub fn has_gpu_metrics(&self) -> bool {
        !self.gpu_metrics.is_empty()
    }

    /// Device memory summed over the metrics, 0 without metrics
    pub fn metric_memory_total(&self) -> f64 {
        self.gpu_metrics.iter().map(|m| m.total_memory).sum()
    }

    /// Classify which resource model the node exposes its GPUs under
    pub fn gpu_mode(&self, names: &ResourceNames) -> GpuMode {
        if names.is_topology_node(&self.labels) {
            GpuMode::Topology
        } else if self.share_memory(names) > 0.0 {
            GpuMode::Share
        } else if self.exclusive_capacity(names) > 0 {
            GpuMode::Exclusive
        } else {
            GpuMode::None
        }
    }
}

/// One container of a pod with its resource limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,

    #[serde(default)]
    pub limits: BTreeMap<String, f64>,
}

impl Container {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            limits: BTreeMap::new(),
        }
    }

    pub fn with_limit(mut self, name: impl Into<String>, quantity: f64) -> Self {
        self.limits.insert(name.into(), quantity);
        self
    }

    pub fn limit(&self, name: &str) -> Option<f64> {
        self.limits.get(name).copied()
    }

    /// Declared GPU memory, 0 when none is requested
    pub fn gpu_memory(&self, names: &ResourceNames) -> f64 {
        first_quantity(&self.limits, &names.share_memory)
            .unwrap_or(0.0)
            .max(0.0)
    }

    /// Declared GPU compute percentage, 0 when none is requested
    pub fn gpu_compute(&self, names: &ResourceNames) -> f64 {
        first_quantity(&self.limits, &names.share_compute)
            .unwrap_or(0.0)
            .max(0.0)
    }

    /// Whole GPUs requested through the exclusive resource
    pub fn whole_gpus(&self, names: &ResourceNames) -> u64 {
        self.limit(&names.exclusive_gpu)
            .or_else(|| self.limit(&names.deprecated_exclusive_gpu))
            .unwrap_or(0.0)
            .max(0.0) as u64
    }

    pub fn topology_gpus(&self, names: &ResourceNames) -> u64 {
        self.limit(&names.topology_gpu).unwrap_or(0.0).max(0.0) as u64
    }
}

/// A pod as seen at snapshot time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    pub name: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Node the pod is bound to, if scheduled
    #[serde(default)]
    pub node_name: Option<String>,

    #[serde(default)]
    pub phase: PodPhase,

    /// Whether a deletion timestamp is set
    #[serde(default)]
    pub deleting: bool,

    /// Whether the pod has a start time
    #[serde(default)]
    pub started: bool,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    #[serde(default)]
    pub containers: Vec<Container>,
}

impl Pod {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            node_name: None,
            phase: PodPhase::Pending,
            deleting: false,
            started: false,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            containers: Vec::new(),
        }
    }

    /// Bind the pod to a node and mark it running
    pub fn on_node(mut self, node: impl Into<String>) -> Self {
        self.node_name = Some(node.into());
        self.phase = PodPhase::Running;
        self.started = true;
        self
    }

    pub fn with_phase(mut self, phase: PodPhase) -> Self {
        self.phase = phase;
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn with_container(mut self, container: Container) -> Self {
        self.containers.push(container);
        self
    }

    /// `namespace/name`
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    /// Deleted or terminal pods no longer hold devices
    pub fn is_completed(&self) -> bool {
        self.deleting || self.phase.is_terminal()
    }

    /// Total declared GPU memory across containers
    pub fn gpu_memory(&self, names: &ResourceNames) -> f64 {
        self.containers.iter().map(|c| c.gpu_memory(names)).sum()
    }

    /// Total whole GPUs across containers
    pub fn whole_gpus(&self, names: &ResourceNames) -> u64 {
        self.containers.iter().map(|c| c.whole_gpus(names)).sum()
    }

    /// Total GPUs requested from the topology scheduler
    pub fn topology_gpus(&self, names: &ResourceNames) -> u64 {
        self.containers.iter().map(|c| c.topology_gpus(names)).sum()
    }
}

/// Nodes and pods captured together
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    #[serde(default)]
    pub nodes: Vec<Node>,

    #[serde(default)]
    pub pods: Vec<Pod>,
}

impl ClusterSnapshot {
    pub fn new(nodes: Vec<Node>, pods: Vec<Pod>) -> Self {
        Self { nodes, pods }
    }

    /// Parse snapshot content, JSON when `json` is set and YAML otherwise
    pub fn parse(content: &str, json: bool) -> Result<Self> {
        let snapshot: Self = if json {
            serde_json::from_str(content)?
        } else {
            serde_yaml::from_str(content)?
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(node) = self.nodes.iter().find(|n| n.name.trim().is_empty()) {
            return Err(crate::Error::invalid_snapshot(format!(
                "node with empty name (address {:?})",
                node.address
            )));
        }
        if let Some(pod) = self.pods.iter().find(|p| p.name.trim().is_empty()) {
            return Err(crate::Error::invalid_snapshot(format!(
                "pod with empty name in namespace {}",
                pod.namespace
            )));
        }
        Ok(())
    }
}

/// Whether a path should be read as JSON rather than YAML
pub fn is_json_path(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{GPU_SHARE_COUNT, GPU_SHARE_MEMORY, NVIDIA_GPU, QGPU_CORE, TOPOLOGY_GPU};

    #[test]
    fn test_node_share_resources() {
        let names = ResourceNames::default();
        let node = Node::new("node-a")
            .with_resource(GPU_SHARE_MEMORY, 60.0)
            .with_resource(GPU_SHARE_COUNT, 4.0);

        assert_eq!(node.share_device_count(&names), 4);
        assert_eq!(node.share_memory(&names), 60.0);
        assert_eq!(node.gpu_mode(&names), GpuMode::Share);
    }

    #[test]
    fn test_device_count_falls_back_to_compute() {
        let names = ResourceNames::default();
        let node = Node::new("node-q").with_resource(QGPU_CORE, 200.0);
        assert_eq!(node.share_device_count(&names), 2);
    }

    #[test]
    fn test_exclusive_and_none_modes() {
        let names = ResourceNames::default();
        let node = Node::new("node-e").with_resource(NVIDIA_GPU, 8.0);
        assert_eq!(node.gpu_mode(&names), GpuMode::Exclusive);
        assert_eq!(node.exclusive_capacity(&names), 8);

        assert_eq!(Node::new("cpu").gpu_mode(&names), GpuMode::None);
        assert_eq!(Node::new("cpu").exclusive_allocatable(&names), None);
    }

    #[test]
    fn test_topology_mode_from_label() {
        let names = ResourceNames::default();
        let node = Node::new("node-t")
            .with_label("ack.node.gpu.schedule", "topology")
            .with_capacity(TOPOLOGY_GPU, 8.0)
            .with_allocatable(TOPOLOGY_GPU, 6.0);
        assert_eq!(node.gpu_mode(&names), GpuMode::Topology);
        assert_eq!(node.topology_capacity(&names), 8);
        assert_eq!(node.topology_allocatable(&names), Some(6));

        let pod = Pod::new("default", "nccl")
            .with_container(Container::new("a").with_limit(TOPOLOGY_GPU, 2.0))
            .with_container(Container::new("b").with_limit(TOPOLOGY_GPU, 2.0));
        assert_eq!(pod.topology_gpus(&names), 4);
    }

    #[test]
    fn test_capacity_and_allocatable_are_distinct() {
        let names = ResourceNames::default();
        let node = Node::new("node-a")
            .with_capacity(GPU_SHARE_COUNT, 4.0)
            .with_allocatable(GPU_SHARE_COUNT, 3.0)
            .with_allocatable(GPU_SHARE_MEMORY, 45.0);
        assert_eq!(node.share_device_capacity(&names), 4);
        assert_eq!(node.share_device_count(&names), 3);
        assert_eq!(node.share_memory_allocatable(&names), Some(45.0));
        assert_eq!(node.share_memory_capacity(&names), None);
    }

    #[test]
    fn test_pod_resources() {
        let names = ResourceNames::default();
        let pod = Pod::new("default", "train")
            .on_node("node-a")
            .with_container(Container::new("a").with_limit(GPU_SHARE_MEMORY, 3.0))
            .with_container(
                Container::new("b")
                    .with_limit(GPU_SHARE_MEMORY, 2.0)
                    .with_limit(NVIDIA_GPU, 1.0),
            );

        assert_eq!(pod.gpu_memory(&names), 5.0);
        assert_eq!(pod.whole_gpus(&names), 1);
        assert_eq!(pod.key(), "default/train");
        assert!(!pod.is_completed());
        assert!(pod.clone().with_phase(PodPhase::Succeeded).is_completed());
    }

    #[test]
    fn test_snapshot_yaml_parsing() {
        let yaml = r#"
nodes:
  - name: node-a
    address: 192.168.0.10
    allocatable:
      aliyun.com/gpu-mem: 60
      aliyun.com/gpu-count: 4
pods:
  - name: binpack-0
    node_name: node-a
    phase: Running
    annotations:
      ALIYUN_COM_GPU_MEM_IDX: "3"
    containers:
      - name: main
        limits:
          aliyun.com/gpu-mem: 3
"#;
        let snapshot = ClusterSnapshot::parse(yaml, false).unwrap();
        assert_eq!(snapshot.nodes.len(), 1);
        assert!(snapshot.nodes[0].ready);
        assert_eq!(snapshot.pods[0].namespace, "default");
        assert_eq!(snapshot.pods[0].phase, PodPhase::Running);
        assert_eq!(snapshot.pods[0].annotation("ALIYUN_COM_GPU_MEM_IDX"), Some("3"));
    }

    #[test]
    fn test_snapshot_rejects_unnamed_node() {
        let json = r#"{"nodes": [{"name": ""}], "pods": []}"#;
        let err = ClusterSnapshot::parse(json, true).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidSnapshot(_)));
    }

    #[test]
    fn test_malformed_content_keeps_parser_category() {
        let err = ClusterSnapshot::parse("{\"nodes\": [", true).unwrap_err();
        assert_eq!(err.category(), "json");

        let err = ClusterSnapshot::parse("nodes: [", false).unwrap_err();
        assert_eq!(err.category(), "yaml");
    }

    #[test]
    fn test_snapshot_json_with_metrics() {
        let json = r#"{
            "nodes": [{
                "name": "n1",
                "gpu_metrics": [
                    {"index": 0, "total_memory": 16, "used_memory": 5.5, "duty_cycle": 40},
                    {"index": 1, "total_memory": 16}
                ]
            }]
        }"#;
        let snapshot = ClusterSnapshot::parse(json, true).unwrap();
        let node = &snapshot.nodes[0];
        assert!(snapshot.pods.is_empty());
        assert!(node.has_gpu_metrics());
        assert_eq!(node.metric_memory_total(), 32.0);
        assert_eq!(node.gpu_metrics[0], DeviceMetric::new(0, 16.0, 5.5, 40.0));
        assert_eq!(node.gpu_metrics[1].used_memory, 0.0);
    }
}
