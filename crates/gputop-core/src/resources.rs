//! Resource and annotation names
//!
//! Device plugins and schedulers advertise GPUs under vendor-specific resource
//! names and record device bindings in pod annotations. `ResourceNames` keeps
//! every such key in one place so the accounting code never hard-codes them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whole-GPU resource advertised by the NVIDIA device plugin
pub const NVIDIA_GPU: &str = "nvidia.com/gpu";

/// Pre-device-plugin whole-GPU resource
pub const DEPRECATED_NVIDIA_GPU: &str = "alpha.kubernetes.io/nvidia-gpu";

/// GPU-share memory resource
pub const GPU_SHARE_MEMORY: &str = "aliyun.com/gpu-mem";

/// GPU-share device count resource
pub const GPU_SHARE_COUNT: &str = "aliyun.com/gpu-count";

/// GPU-share compute percentage resource
pub const GPU_SHARE_CORE: &str = "aliyun.com/gpu-core.percentage";

/// Whole-GPU resource of topology-aware scheduling
pub const TOPOLOGY_GPU: &str = "aliyun.com/gpu";

/// qGPU memory resource
pub const QGPU_MEMORY: &str = "tke.cloud.tencent.com/qgpu-memory";

/// qGPU compute percentage resource
pub const QGPU_CORE: &str = "tke.cloud.tencent.com/qgpu-core";

/// Legacy single-device binding annotation
pub const DEVICE_INDEX_ANNOTATION: &str = "ALIYUN_COM_GPU_MEM_IDX";

/// Per-container GPU memory allocation written by the share scheduler,
/// JSON shaped `{"<container index>": {"<device index>": <memory>}}`
pub const SHARE_ALLOCATION_ANNOTATION: &str = "scheduler.framework.gpushare.allocation";

/// Per-container GPU core allocation, same shape as the memory allocation
pub const CORE_ALLOCATION_ANNOTATION: &str = "scheduler.framework.gpushare.core.allocation";

/// Comma-separated device indices chosen by the topology scheduler
pub const TOPOLOGY_ALLOCATION_ANNOTATION: &str = "topology.kubernetes.io/gpu-group";

/// Node label marking topology-aware GPU nodes
pub const TOPOLOGY_NODE_LABEL: &str = "ack.node.gpu.schedule=topology";

/// Per-container binding annotation prefix, followed by the container name
pub const CONTAINER_INDEX_PREFIX: &str = "tke.cloud.tencent.com/gpu-index-";

/// Job-level requested GPU count stamped on pods by the submitter
pub const JOB_GPU_REQUEST_ANNOTATION: &str = "requestGPUsOfJobOwner";

/// Names of every resource and annotation the accounting engine reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceNames {
    /// Whole-GPU resource
    pub exclusive_gpu: String,

    /// Fallback whole-GPU resource
    pub deprecated_exclusive_gpu: String,

    /// Whole-GPU resource on topology nodes
    pub topology_gpu: String,

    /// `key=value` labels, any of which marks a topology node
    pub topology_node_labels: Vec<String>,

    /// Shared memory resources, first present wins
    pub share_memory: Vec<String>,

    /// Shared device count resources, first present wins
    pub share_count: Vec<String>,

    /// Shared compute percentage resources, first present wins
    pub share_compute: Vec<String>,

    /// Legacy single-device binding annotation
    pub device_index_annotation: String,

    /// Per-container memory allocation annotation
    pub share_allocation_annotation: String,

    /// Per-container core allocation annotation
    pub core_allocation_annotation: String,

    /// Topology device list annotation
    pub topology_allocation_annotation: String,

    /// Per-container binding annotation prefix
    pub container_index_prefix: String,

    /// Job-level requested GPU annotation
    pub job_gpu_request_annotation: String,
}

impl ResourceNames {
    /// Annotation key holding the device list of one container
    pub fn container_index_key(&self, container: &str) -> String {
        format!("{}{}", self.container_index_prefix, container)
    }

    /// Container name encoded in a binding annotation key, if it is one
    pub fn container_from_index_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.container_index_prefix.as_str())
            .filter(|name| !name.is_empty())
    }

    /// Whether node labels carry any of the topology markers
    pub fn is_topology_node(&self, labels: &BTreeMap<String, String>) -> bool {
        self.topology_node_labels.iter().any(|marker| {
            let (key, value) = marker.split_once('=').unwrap_or((marker.as_str(), ""));
            labels.get(key.trim()).map(|v| v == value.trim()).unwrap_or(false)
        })
    }

    pub fn validate(&self) -> crate::Result<()> {
        let scalars = [
            ("exclusive_gpu", &self.exclusive_gpu),
            ("deprecated_exclusive_gpu", &self.deprecated_exclusive_gpu),
            ("topology_gpu", &self.topology_gpu),
            ("device_index_annotation", &self.device_index_annotation),
            ("share_allocation_annotation", &self.share_allocation_annotation),
            ("core_allocation_annotation", &self.core_allocation_annotation),
            ("topology_allocation_annotation", &self.topology_allocation_annotation),
            ("container_index_prefix", &self.container_index_prefix),
            ("job_gpu_request_annotation", &self.job_gpu_request_annotation),
        ];
        for (field, value) in scalars {
            if value.trim().is_empty() {
                return Err(crate::Error::config(format!("resources.{} cannot be empty", field)));
            }
        }

        let lists = [
            ("share_memory", &self.share_memory),
            ("share_count", &self.share_count),
            ("share_compute", &self.share_compute),
        ];
        for (field, values) in lists {
            if values.is_empty() || values.iter().any(|v| v.trim().is_empty()) {
                return Err(crate::Error::config(format!(
                    "resources.{} must list at least one non-empty name",
                    field
                )));
            }
        }

        if let Some(marker) = self.topology_node_labels.iter().find(|m| !m.contains('=')) {
            return Err(crate::Error::config(format!(
                "resources.topology_node_labels entry {:?} is not key=value",
                marker
            )));
        }

        Ok(())
    }
}

impl Default for ResourceNames {
    fn default() -> Self {
        Self {
            exclusive_gpu: NVIDIA_GPU.to_string(),
            deprecated_exclusive_gpu: DEPRECATED_NVIDIA_GPU.to_string(),
            topology_gpu: TOPOLOGY_GPU.to_string(),
            topology_node_labels: vec![TOPOLOGY_NODE_LABEL.to_string()],
            share_memory: vec![GPU_SHARE_MEMORY.to_string(), QGPU_MEMORY.to_string()],
            share_count: vec![GPU_SHARE_COUNT.to_string()],
            share_compute: vec![GPU_SHARE_CORE.to_string(), QGPU_CORE.to_string()],
            device_index_annotation: DEVICE_INDEX_ANNOTATION.to_string(),
            share_allocation_annotation: SHARE_ALLOCATION_ANNOTATION.to_string(),
            core_allocation_annotation: CORE_ALLOCATION_ANNOTATION.to_string(),
            topology_allocation_annotation: TOPOLOGY_ALLOCATION_ANNOTATION.to_string(),
            container_index_prefix: CONTAINER_INDEX_PREFIX.to_string(),
            job_gpu_request_annotation: JOB_GPU_REQUEST_ANNOTATION.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names_validate() {
        assert!(ResourceNames::default().validate().is_ok());
    }

    #[test]
    fn test_container_index_key_round_trip() {
        let names = ResourceNames::default();
        let key = names.container_index_key("worker");
        assert_eq!(key, "tke.cloud.tencent.com/gpu-index-worker");
        assert_eq!(names.container_from_index_key(&key), Some("worker"));
        assert_eq!(names.container_from_index_key(CONTAINER_INDEX_PREFIX), None);
        assert_eq!(names.container_from_index_key("app"), None);
    }

    #[test]
    fn test_empty_names_rejected() {
        let mut names = ResourceNames::default();
        names.share_memory.clear();
        assert!(names.validate().is_err());

        let mut names = ResourceNames::default();
        names.device_index_annotation = " ".to_string();
        assert!(names.validate().is_err());

        let mut names = ResourceNames::default();
        names.share_allocation_annotation.clear();
        assert!(names.validate().is_err());

        let mut names = ResourceNames::default();
        names.topology_node_labels = vec!["gpu-topology".to_string()];
        assert!(names.validate().is_err());
    }

    #[test]
    fn test_topology_node_labels() {
        let names = ResourceNames::default();
        let mut labels = BTreeMap::new();
        assert!(!names.is_topology_node(&labels));

        labels.insert("ack.node.gpu.schedule".to_string(), "share".to_string());
        assert!(!names.is_topology_node(&labels));

        labels.insert("ack.node.gpu.schedule".to_string(), "topology".to_string());
        assert!(names.is_topology_node(&labels));
    }
}
