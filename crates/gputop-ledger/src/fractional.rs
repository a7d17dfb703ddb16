//! Fractional GPU accounting
//!
//! Pods scheduled by the fractional (qGPU style) scheduler carry one binding
//! annotation per container, listing the devices that container runs on.
//! A container asking for less than a whole device's compute shares it and
//! is billed its declared memory on every listed device. A container asking
//! for 100% compute or more owns the device and is billed the device's full
//! capacity instead.

use crate::DeviceSlot;
use gputop_core::{Container, Pod, ResourceNames};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Compute percentage at which a container owns its devices outright
pub const WHOLE_DEVICE_COMPUTE: f64 = 100.0;

/// Memory and compute one pod contributes, per device slot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PodAccount {
    pub memory: BTreeMap<DeviceSlot, f64>,
    pub compute: BTreeMap<DeviceSlot, u32>,
}

impl PodAccount {
    /// Account for a single device, as produced by legacy binding
    pub fn single(slot: DeviceSlot, memory: f64) -> Self {
        let mut account = Self::default();
        account.memory.insert(slot, memory);
        account
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty() && self.compute.is_empty()
    }

    pub fn total_memory(&self) -> f64 {
        self.memory.values().sum()
    }

    /// Every slot touched, in slot order
    pub fn slots(&self) -> BTreeSet<DeviceSlot> {
        self.memory.keys().chain(self.compute.keys()).copied().collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FractionalGpuAccountant {
    names: ResourceNames,
}

impl FractionalGpuAccountant {
    pub fn new(names: ResourceNames) -> Self {
        Self { names }
    }

    /// Whether the pod was bound by the fractional scheduler
    pub fn is_fractional(&self, pod: &Pod) -> bool {
        pod.annotations
            .keys()
            .any(|key| self.names.container_from_index_key(key).is_some())
    }

    /// Devices a container is bound to, `None` without a binding annotation
    pub fn bound_slots(&self, pod: &Pod, container: &Container) -> Option<Vec<DeviceSlot>> {
        let value = pod.annotation(&self.names.container_index_key(&container.name))?;

        let slots = value
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| match entry.parse::<DeviceSlot>() {
                Ok(slot) => slot,
                Err(e) => {
                    warn!(
                        pod = %pod.key(),
                        container = %container.name,
                        entry,
                        error = %e,
                        "Malformed device index in binding annotation"
                    );
                    DeviceSlot::Pending
                }
            })
            .collect();

        Some(slots)
    }

    /// Per-device contribution of a fractional pod
    ///
    /// `capacity` gives the memory of a device, billed in full when a
    /// container owns it.
    pub fn account_pod<F>(&self, pod: &Pod, capacity: F) -> PodAccount
    where
        F: Fn(DeviceSlot) -> f64,
    {
        let mut account = PodAccount::default();
        let mut owned = BTreeSet::new();

        for container in &pod.containers {
            let memory = container.gpu_memory(&self.names);
            let compute = container.gpu_compute(&self.names);
            if memory <= 0.0 && compute <= 0.0 {
                continue;
            }

            let slots = match self.bound_slots(pod, container) {
                Some(slots) if !slots.is_empty() => slots,
                _ => {
                    debug!(
                        pod = %pod.key(),
                        container = %container.name,
                        "Container requests GPU but is not bound to a device"
                    );
                    vec![DeviceSlot::Pending]
                }
            };

            if compute >= WHOLE_DEVICE_COMPUTE {
                owned.extend(slots);
                continue;
            }

            let percent = compute.round() as u32;
            for slot in slots {
                *account.memory.entry(slot).or_default() += memory;
                if percent > 0 {
                    *account.compute.entry(slot).or_default() += percent;
                }
            }
        }

        // Ownership replaces whatever sharing containers of the same pod added.
        for slot in owned {
            account.memory.insert(slot, capacity(slot));
            account.compute.insert(slot, WHOLE_DEVICE_COMPUTE as u32);
        }

        account
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gputop_core::resources::{CONTAINER_INDEX_PREFIX, QGPU_CORE, QGPU_MEMORY};

    fn container(name: &str, memory: f64, compute: f64) -> Container {
        Container::new(name)
            .with_limit(QGPU_MEMORY, memory)
            .with_limit(QGPU_CORE, compute)
    }

    fn bind(pod: Pod, container: &str, devices: &str) -> Pod {
        pod.with_annotation(format!("{}{}", CONTAINER_INDEX_PREFIX, container), devices)
    }

    #[test]
    fn test_is_fractional() {
        let accountant = FractionalGpuAccountant::default();
        let pod = Pod::new("default", "p").on_node("n");
        assert!(!accountant.is_fractional(&pod));
        assert!(accountant.is_fractional(&bind(pod, "main", "0")));
    }

    #[test]
    fn test_sharing_bills_declared_memory_per_device() {
        let accountant = FractionalGpuAccountant::default();
        let pod = bind(
            Pod::new("default", "share").on_node("n").with_container(container("main", 3.0, 30.0)),
            "main",
            "3",
        );

        let account = accountant.account_pod(&pod, |_| 15.0);
        assert_eq!(account.memory.len(), 1);
        assert_eq!(account.memory[&DeviceSlot::Resolved(3)], 3.0);
        assert_eq!(account.compute[&DeviceSlot::Resolved(3)], 30);
    }

    #[test]
    fn test_multi_device_container() {
        let accountant = FractionalGpuAccountant::default();
        let pod = bind(
            Pod::new("default", "multi").on_node("n").with_container(container("main", 4.0, 50.0)),
            "main",
            "0, 2,",
        );

        let account = accountant.account_pod(&pod, |_| 15.0);
        assert_eq!(account.memory[&DeviceSlot::Resolved(0)], 4.0);
        assert_eq!(account.memory[&DeviceSlot::Resolved(2)], 4.0);
        assert_eq!(account.total_memory(), 8.0);
    }

    #[test]
    fn test_whole_device_override_bills_capacity_once() {
        let accountant = FractionalGpuAccountant::default();
        let pod = Pod::new("default", "owner")
            .on_node("n")
            .with_container(container("sidecar", 2.0, 20.0))
            .with_container(container("main", 1.0, 100.0));
        let pod = bind(bind(pod, "sidecar", "1"), "main", "1");

        let account = accountant.account_pod(&pod, |_| 15.0);
        assert_eq!(account.memory[&DeviceSlot::Resolved(1)], 15.0);
        assert_eq!(account.compute[&DeviceSlot::Resolved(1)], 100);

        // container order does not matter
        let reversed = Pod::new("default", "owner")
            .on_node("n")
            .with_container(container("main", 1.0, 100.0))
            .with_container(container("sidecar", 2.0, 20.0));
        let reversed = bind(bind(reversed, "sidecar", "1"), "main", "1");
        assert_eq!(accountant.account_pod(&reversed, |_| 15.0), account);
    }

    #[test]
    fn test_unbound_and_malformed_go_to_pending() {
        let accountant = FractionalGpuAccountant::default();
        let pod = Pod::new("default", "odd")
            .on_node("n")
            .with_container(container("a", 2.0, 10.0))
            .with_container(container("b", 1.0, 10.0))
            .with_container(Container::new("cpu"));
        let pod = bind(pod, "b", "x");

        let account = accountant.account_pod(&pod, |_| 15.0);
        assert_eq!(account.memory.len(), 1);
        assert_eq!(account.memory[&DeviceSlot::Pending], 3.0);
        assert_eq!(account.compute[&DeviceSlot::Pending], 20);
    }

    #[test]
    fn test_pod_without_gpu_requests_is_empty() {
        let accountant = FractionalGpuAccountant::default();
        let pod = bind(
            Pod::new("default", "cpu").on_node("n").with_container(Container::new("main")),
            "main",
            "0",
        );
        assert!(accountant.account_pod(&pod, |_| 15.0).is_empty());
    }
}
