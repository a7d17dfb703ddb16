//! Topology-aware whole-device binding
//!
//! The topology scheduler hands out whole devices and lists the chosen
//! device indices on the pod as a comma-separated annotation. Each listed
//! device is billed its full memory.

use crate::{DeviceSlot, PodAccount};
use gputop_core::{Pod, ResourceNames};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct TopologyAllocationResolver {
    names: ResourceNames,
}

impl TopologyAllocationResolver {
    pub fn new(names: ResourceNames) -> Self {
        Self { names }
    }

    /// Devices listed in the topology annotation, in annotation order
    pub fn bound_slots(&self, pod: &Pod) -> Vec<DeviceSlot> {
        let Some(value) = pod.annotation(&self.names.topology_allocation_annotation) else {
            return Vec::new();
        };

        value
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| match entry.parse::<DeviceSlot>() {
                Ok(slot) => slot,
                Err(e) => {
                    warn!(pod = %pod.key(), entry, error = %e, "Malformed device in topology allocation");
                    DeviceSlot::Pending
                }
            })
            .collect()
    }

    /// Devices a topology pod holds, each billed `capacity(slot)`
    ///
    /// A pod that asks for GPUs without a device list lands on the pending
    /// slot with no memory, so it still shows as allocated but unbound.
    pub fn account_pod<F>(&self, pod: &Pod, capacity: F) -> PodAccount
    where
        F: Fn(DeviceSlot) -> f64,
    {
        let mut slots = self.bound_slots(pod);
        if slots.is_empty() {
            debug!(pod = %pod.key(), "Topology pod has no device list");
            slots.push(DeviceSlot::Pending);
        }

        let mut account = PodAccount::default();
        for slot in slots {
            let memory = if slot.is_pending() { 0.0 } else { capacity(slot) };
            account.memory.insert(slot, memory);
        }
        account
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gputop_core::resources::TOPOLOGY_ALLOCATION_ANNOTATION;

    fn pod(devices: Option<&str>) -> Pod {
        let pod = Pod::new("default", "nccl").on_node("node-t");
        match devices {
            Some(devices) => pod.with_annotation(TOPOLOGY_ALLOCATION_ANNOTATION, devices),
            None => pod,
        }
    }

    #[test]
    fn test_bound_slots() {
        let resolver = TopologyAllocationResolver::default();
        assert_eq!(
            resolver.bound_slots(&pod(Some("0, 3,"))),
            vec![DeviceSlot::Resolved(0), DeviceSlot::Resolved(3)]
        );
        assert_eq!(resolver.bound_slots(&pod(Some("x"))), vec![DeviceSlot::Pending]);
        assert!(resolver.bound_slots(&pod(None)).is_empty());
    }

    #[test]
    fn test_each_device_billed_once() {
        let resolver = TopologyAllocationResolver::default();
        let account = resolver.account_pod(&pod(Some("1,2,2")), |_| 16.0);
        assert_eq!(account.memory.len(), 2);
        assert_eq!(account.total_memory(), 32.0);
    }

    #[test]
    fn test_unlisted_pod_is_pending() {
        let resolver = TopologyAllocationResolver::default();
        let account = resolver.account_pod(&pod(None), |_| 16.0);
        assert_eq!(account.memory[&DeviceSlot::Pending], 0.0);
        assert!(!account.is_empty());
    }
}
