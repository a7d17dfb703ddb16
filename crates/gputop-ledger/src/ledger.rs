//! Per-node device ledger
//!
//! A ledger starts from the node's device capacity and accumulates pod
//! contributions slot by slot. Once sealed it only answers queries.

use crate::{DeviceSlot, LedgerError, PodAccount, Result};
use gputop_core::{DeviceMetric, GpuMode, Node, NodeRole, NodeStatus, Pod, ResourceNames};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerState {
    Uninitialized,
    CapacityKnown,
    PartiallyAllocated,
    Aggregated,
}

/// A pod bound to a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodRef {
    pub namespace: String,
    pub name: String,
    pub memory: f64,
    pub compute: u32,
}

/// Usage of one device slot, in raw memory units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub slot: DeviceSlot,
    pub total_memory: f64,
    pub used_memory: f64,
    pub used_compute: u32,
    pub pods: Vec<PodRef>,
    /// Sampled telemetry, when the node reports any
    pub metric: Option<DeviceMetric>,
}

impl Device {
    fn new(slot: DeviceSlot, total_memory: f64) -> Self {
        Self {
            slot,
            total_memory,
            used_memory: 0.0,
            used_compute: 0,
            pods: Vec::new(),
            metric: None,
        }
    }

    fn from_metric(metric: &DeviceMetric, fallback_memory: f64) -> Self {
        let total_memory = if metric.total_memory > 0.0 {
            metric.total_memory
        } else {
            fallback_memory
        };
        Self {
            metric: Some(metric.clone()),
            ..Self::new(DeviceSlot::Resolved(metric.index), total_memory)
        }
    }

    /// Used fraction of this device, 0 for the pending slot
    pub fn utilization(&self) -> f64 {
        if self.slot.is_pending() || self.total_memory <= 0.0 {
            0.0
        } else {
            self.used_memory / self.total_memory
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ledger {
    name: String,
    address: String,
    roles: Vec<NodeRole>,
    status: NodeStatus,
    mode: GpuMode,
    device_count: u32,
    total_memory_raw: f64,
    memory_capacity_raw: Option<f64>,
    memory_allocatable_raw: Option<f64>,
    device_capacity: u32,
    device_allocatable: Option<u32>,
    total_core: f64,
    whole_allocated: u64,
    device_health: Vec<bool>,
    metrics_enabled: bool,
    devices: BTreeMap<DeviceSlot, Device>,
    state: LedgerState,
}

impl Ledger {
    pub fn new(node: &Node, names: &ResourceNames) -> Self {
        let mode = node.gpu_mode(names);
        let metrics_enabled = mode != GpuMode::None && node.has_gpu_metrics();
        let metric_count = node.gpu_metrics.len() as u32;

        // Telemetry, when present, is the authority on devices and memory.
        let (reported, capacity, allocatable) = match mode {
            GpuMode::Share => (
                node.share_device_count(names),
                node.share_device_capacity(names),
                None,
            ),
            GpuMode::Exclusive => (
                node.exclusive_capacity(names),
                node.exclusive_capacity(names),
                node.exclusive_allocatable(names),
            ),
            GpuMode::Topology => (
                node.topology_capacity(names),
                node.topology_capacity(names),
                node.topology_allocatable(names),
            ),
            GpuMode::None => (0, 0, None),
        };
        let (device_count, device_capacity) = if metrics_enabled {
            (metric_count, metric_count)
        } else {
            (reported, capacity)
        };

        let metric_memory = node.metric_memory_total();
        let total_memory_raw = match mode {
            GpuMode::Share if metrics_enabled && metric_memory > 0.0 => metric_memory,
            GpuMode::Share => node.share_memory(names),
            GpuMode::Exclusive | GpuMode::Topology if metrics_enabled => metric_memory,
            GpuMode::Exclusive | GpuMode::Topology | GpuMode::None => 0.0,
        };

        let mut ledger = Self {
            name: node.name.clone(),
            address: node.display_address().to_string(),
            roles: node.roles(),
            status: node.status(),
            mode,
            device_count,
            total_memory_raw,
            memory_capacity_raw: node.share_memory_capacity(names),
            memory_allocatable_raw: node.share_memory_allocatable(names),
            device_capacity,
            device_allocatable: allocatable,
            total_core: match mode {
                GpuMode::Share => node.share_compute_capacity(names),
                _ => 0.0,
            },
            whole_allocated: 0,
            device_health: node.device_health.clone(),
            metrics_enabled,
            devices: BTreeMap::new(),
            state: LedgerState::Uninitialized,
        };

        let per_device = ledger.per_device_memory();
        if metrics_enabled {
            for metric in &node.gpu_metrics {
                let device = Device::from_metric(metric, per_device);
                ledger.devices.insert(device.slot, device);
            }
        } else if matches!(mode, GpuMode::Share | GpuMode::Topology) {
            for index in 0..device_count {
                let slot = DeviceSlot::Resolved(index);
                ledger.devices.insert(slot, Device::new(slot, per_device));
            }
        }
        if device_count > 0 {
            ledger.state = LedgerState::CapacityKnown;
        }

        ledger
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn roles(&self) -> &[NodeRole] {
        &self.roles
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn mode(&self) -> GpuMode {
        self.mode
    }

    pub fn state(&self) -> LedgerState {
        self.state
    }

    pub fn is_sealed(&self) -> bool {
        self.state == LedgerState::Aggregated
    }

    pub fn metrics_enabled(&self) -> bool {
        self.metrics_enabled
    }

    /// Memory of one device; 0 on a node without devices
    pub fn per_device_memory(&self) -> f64 {
        if self.device_count == 0 {
            0.0
        } else {
            self.total_memory_raw / f64::from(self.device_count)
        }
    }

    /// Capacity of a slot, falling back to the per-device average
    pub fn capacity_of(&self, slot: DeviceSlot) -> f64 {
        self.devices
            .get(&slot)
            .filter(|d| !d.slot.is_pending())
            .map(|d| d.total_memory)
            .unwrap_or_else(|| self.per_device_memory())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_sealed() {
            return Err(LedgerError::Sealed {
                node: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Add one pod's usage of one slot
    pub fn fold(&mut self, slot: DeviceSlot, memory: f64, compute: u32, pod: &Pod) -> Result<()> {
        self.ensure_open()?;

        let per_device = self.per_device_memory();
        let device = self
            .devices
            .entry(slot)
            .or_insert_with(|| Device::new(slot, per_device));
        device.used_memory += memory;
        device.used_compute += compute;
        device.pods.push(PodRef {
            namespace: pod.namespace.clone(),
            name: pod.name.clone(),
            memory,
            compute,
        });

        self.state = LedgerState::PartiallyAllocated;
        Ok(())
    }

    /// Fold every slot of a pod's account
    pub fn fold_account(&mut self, account: &PodAccount, pod: &Pod) -> Result<()> {
        for slot in account.slots() {
            let memory = account.memory.get(&slot).copied().unwrap_or(0.0);
            let compute = account.compute.get(&slot).copied().unwrap_or(0);
            self.fold(slot, memory, compute, pod)?;
        }
        Ok(())
    }

    /// Add whole GPUs held by a pod on an exclusive or topology node
    pub fn record_whole_devices(&mut self, gpus: u64) -> Result<()> {
        self.ensure_open()?;
        self.whole_allocated += gpus;
        self.state = LedgerState::PartiallyAllocated;
        Ok(())
    }

    pub fn seal(&mut self) {
        self.state = LedgerState::Aggregated;
    }

    pub fn has_pending_allocations(&self) -> bool {
        self.devices
            .get(&DeviceSlot::Pending)
            .map(|d| d.used_memory > 0.0 || !d.pods.is_empty())
            .unwrap_or(false)
    }

    /// Raw memory allocated to pods, pending slot included
    ///
    /// Exclusive pods are not bound to a device index, so each whole GPU
    /// they hold is billed the per-device average.
    pub fn allocated_memory(&self) -> f64 {
        match self.mode {
            GpuMode::Exclusive => self.whole_allocated as f64 * self.per_device_memory(),
            _ => self.devices.values().map(|d| d.used_memory).sum(),
        }
    }

    pub fn total_memory(&self) -> f64 {
        self.total_memory_raw
    }

    /// Devices reported by the node, never counting the pending slot
    pub fn total_devices(&self) -> u32 {
        self.device_count
    }

    pub fn allocated_devices(&self) -> f64 {
        match self.mode {
            GpuMode::Share => {
                let used: f64 = self
                    .devices
                    .values()
                    .filter(|d| !d.slot.is_pending())
                    .map(Device::utilization)
                    .sum();
                (used * 10.0).round() / 10.0
            }
            GpuMode::Exclusive | GpuMode::Topology => self.whole_allocated as f64,
            GpuMode::None => 0.0,
        }
    }

    /// Compute percentage the node advertises across all devices
    pub fn total_core(&self) -> f64 {
        self.total_core
    }

    /// Compute percentage billed to pods, pending slot included
    pub fn allocated_core(&self) -> f64 {
        match self.mode {
            GpuMode::Share => self.devices.values().map(|d| f64::from(d.used_compute)).sum(),
            _ => 0.0,
        }
    }

    /// Memory in use according to telemetry, `None` without telemetry
    pub fn metric_used_memory(&self) -> Option<f64> {
        self.metrics_enabled.then(|| {
            self.devices
                .values()
                .filter_map(|d| d.metric.as_ref())
                .map(|m| m.used_memory)
                .sum()
        })
    }

    /// Average duty cycle across devices, `None` without telemetry
    pub fn duty_cycle(&self) -> Option<f64> {
        let cycles: Vec<f64> = self
            .devices
            .values()
            .filter_map(|d| d.metric.as_ref())
            .map(|m| m.duty_cycle)
            .collect();
        if cycles.is_empty() {
            None
        } else {
            Some(cycles.iter().sum::<f64>() / cycles.len() as f64)
        }
    }

    pub fn unhealthy_device_count(&self) -> u32 {
        if !self.device_health.is_empty() {
            return self.device_health.iter().filter(|healthy| !**healthy).count() as u32;
        }

        match self.mode {
            GpuMode::Exclusive | GpuMode::Topology => match self.device_allocatable {
                Some(allocatable) if self.device_capacity > 0 => {
                    self.device_capacity.saturating_sub(allocatable)
                }
                _ => 0,
            },
            GpuMode::Share => {
                let (Some(capacity), Some(allocatable)) =
                    (self.memory_capacity_raw, self.memory_allocatable_raw)
                else {
                    return 0;
                };
                if self.device_capacity == 0 {
                    return 0;
                }
                if capacity <= 0.0 {
                    return self.device_capacity;
                }
                let missing = (capacity - allocatable).max(0.0);
                (f64::from(self.device_capacity) * missing / capacity).floor() as u32
            }
            GpuMode::None => 0,
        }
    }

    /// Devices in slot order, pending last
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn device(&self, slot: DeviceSlot) -> Option<&Device> {
        self.devices.get(&slot)
    }
}
