//! Share scheduler device bindings
//!
//! The share scheduler records, per container, how much memory and compute
//! it placed on which device as a JSON annotation shaped
//! `{"<container index>": {"<device index>": <amount>}}`. Older schedulers
//! only stamp a single device index on the pod, and everything the pod
//! declares is billed to that device. The per-container record wins when
//! both are present.

use crate::{DeviceSlot, PodAccount};
use gputop_core::{Pod, ResourceNames};
use std::collections::BTreeMap;
use tracing::warn;

/// Amount per device index, per container index
type ContainerAllocation = BTreeMap<String, BTreeMap<String, f64>>;

#[derive(Debug, Clone, Default)]
pub struct DeviceAllocationResolver {
    names: ResourceNames,
}

impl DeviceAllocationResolver {
    pub fn new(names: ResourceNames) -> Self {
        Self { names }
    }

    pub fn names(&self) -> &ResourceNames {
        &self.names
    }

    /// Memory and compute a share-mode pod holds, `None` when it holds nothing
    pub fn account(&self, pod: &Pod) -> Option<PodAccount> {
        let mut account = match self.allocation_by_device(pod, &self.names.share_allocation_annotation) {
            Some(memory) => PodAccount {
                memory,
                compute: BTreeMap::new(),
            },
            None => self
                .resolve(pod)
                .map(|(slot, memory)| PodAccount::single(slot, memory))
                .unwrap_or_default(),
        };

        if let Some(cores) = self.allocation_by_device(pod, &self.names.core_allocation_annotation) {
            for (slot, core) in cores {
                account.compute.insert(slot, core.round() as u32);
            }
        }

        (!account.is_empty()).then_some(account)
    }

    /// Per-device sums of a per-container allocation annotation
    ///
    /// `None` when the annotation is missing, unreadable or lists no container.
    pub fn allocation_by_device(&self, pod: &Pod, key: &str) -> Option<BTreeMap<DeviceSlot, f64>> {
        let value = pod.annotation(key)?;
        let containers: ContainerAllocation = match serde_json::from_str(value) {
            Ok(containers) => containers,
            Err(e) => {
                warn!(pod = %pod.key(), annotation = key, error = %e, "Unreadable allocation annotation");
                return None;
            }
        };
        if containers.is_empty() {
            return None;
        }

        let mut devices = BTreeMap::new();
        for (index, amount) in containers.into_values().flatten() {
            *devices.entry(self.slot_from(pod, &index)).or_default() += amount.max(0.0);
        }
        Some(devices)
    }

    /// Device slot and declared memory for a pod
    ///
    /// `None` when the pod declares no GPU memory.
    pub fn resolve(&self, pod: &Pod) -> Option<(DeviceSlot, f64)> {
        let memory = pod.gpu_memory(&self.names);
        if memory <= 0.0 {
            return None;
        }
        Some((self.resolve_slot(pod), memory))
    }

    /// Read the binding annotation, degrading to `Pending` when it is unusable
    pub fn resolve_slot(&self, pod: &Pod) -> DeviceSlot {
        let key = &self.names.device_index_annotation;
        let Some(value) = pod.annotation(key) else {
            warn!(pod = %pod.key(), annotation = %key, "Pod has no device binding annotation");
            return DeviceSlot::Pending;
        };

        self.slot_from(pod, value)
    }

    fn slot_from(&self, pod: &Pod, value: &str) -> DeviceSlot {
        match value.trim().parse::<i64>() {
            Ok(-1) => DeviceSlot::Pending,
            Ok(index) => match u32::try_from(index) {
                Ok(index) => DeviceSlot::Resolved(index),
                Err(_) => {
                    warn!(pod = %pod.key(), value, "Negative device index in binding annotation");
                    DeviceSlot::Pending
                }
            },
            Err(e) => {
                warn!(pod = %pod.key(), value, error = %e, "Malformed device binding annotation");
                DeviceSlot::Pending
            }
        }
    }
}
