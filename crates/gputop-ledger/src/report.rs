//! Aggregated views over sealed ledgers
//!
//! Every figure is summed in raw units first and converted or divided last,
//! so node rows, device rows and the cluster line agree with each other.

use crate::unit::to_gib;
use crate::{DeviceSlot, Ledger, MemoryUnit, PodRef};
use chrono::{DateTime, Utc};
use gputop_core::{GpuMode, NodeRole, NodeStatus};
use serde::Serialize;

/// `part / total * 100`, 0 when there is no total
pub fn percent(part: f64, total: f64) -> f64 {
    if total == 0.0 {
        0.0
    } else {
        part / total * 100.0
    }
}

/// One row per node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSummary {
    pub name: String,
    pub address: String,
    pub roles: String,
    pub status: NodeStatus,
    pub mode: GpuMode,
    pub total_devices: u32,
    pub allocated_devices: f64,
    pub unhealthy_devices: u32,
    pub total_memory_gib: f64,
    pub allocated_memory_gib: f64,
    pub memory_percent: f64,
    pub total_core: f64,
    pub allocated_core: f64,
    /// Memory in use according to device telemetry
    pub used_memory_gib: Option<f64>,
    /// Average duty cycle according to device telemetry
    pub duty_cycle: Option<f64>,
    pub has_pending_allocations: bool,
}

/// One row per device slot of a node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceRow {
    pub node: String,
    pub slot: DeviceSlot,
    pub total_memory_gib: f64,
    pub used_memory_gib: f64,
    pub memory_percent: f64,
    pub compute_percent: u32,
    pub metric_used_memory_gib: Option<f64>,
    pub duty_cycle: Option<f64>,
    /// Bound pods, memory in GiB
    pub pods: Vec<PodRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub node_count: usize,
    pub total_devices: u32,
    pub allocated_devices: f64,
    pub unhealthy_devices: u32,
    pub total_memory_gib: f64,
    pub allocated_memory_gib: f64,
    pub memory_percent: f64,
    pub device_percent: f64,
    pub unhealthy_percent: f64,
    pub total_core: f64,
    pub allocated_core: f64,
    pub core_percent: f64,
    pub has_pending_allocations: bool,
    pub unit: Option<MemoryUnit>,
    pub generated_at: DateTime<Utc>,
}

/// Result of one accounting pass
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    #[serde(skip)]
    pub ledgers: Vec<Ledger>,
    pub nodes: Vec<NodeSummary>,
    pub devices: Vec<DeviceRow>,
    pub cluster: ClusterSummary,
}

impl Report {
    pub fn from_ledgers(ledgers: Vec<Ledger>, unit: Option<MemoryUnit>) -> Self {
        Self {
            nodes: AggregationReporter::node_rows(&ledgers, unit),
            devices: AggregationReporter::device_rows(&ledgers, unit),
            cluster: AggregationReporter::summarize(&ledgers, unit),
            ledgers,
        }
    }

    pub fn ledger(&self, node: &str) -> Option<&Ledger> {
        self.ledgers.iter().find(|l| l.name() == node)
    }

    /// Keep only the named nodes; an empty filter keeps everything
    pub fn retain_nodes(&mut self, names: &[String]) {
        if names.is_empty() {
            return;
        }
        let unit = self.cluster.unit;
        self.ledgers.retain(|l| names.iter().any(|n| n == l.name()));
        *self = Self::from_ledgers(std::mem::take(&mut self.ledgers), unit);
    }
}

pub struct AggregationReporter;

impl AggregationReporter {
    pub fn summarize(ledgers: &[Ledger], unit: Option<MemoryUnit>) -> ClusterSummary {
        let total_memory: f64 = ledgers.iter().map(Ledger::total_memory).sum();
        let allocated_memory: f64 = ledgers.iter().map(Ledger::allocated_memory).sum();
        let total_devices: u32 = ledgers.iter().map(Ledger::total_devices).sum();
        let allocated_devices: f64 = ledgers.iter().map(Ledger::allocated_devices).sum();
        let allocated_devices = (allocated_devices * 10.0).round() / 10.0;
        let unhealthy_devices: u32 = ledgers.iter().map(Ledger::unhealthy_device_count).sum();
        let total_core: f64 = ledgers.iter().map(Ledger::total_core).sum();
        let allocated_core: f64 = ledgers.iter().map(Ledger::allocated_core).sum();

        ClusterSummary {
            node_count: ledgers.len(),
            total_devices,
            allocated_devices,
            unhealthy_devices,
            total_memory_gib: to_gib(unit, total_memory),
            allocated_memory_gib: to_gib(unit, allocated_memory),
            memory_percent: percent(allocated_memory, total_memory),
            device_percent: percent(allocated_devices, f64::from(total_devices)),
            unhealthy_percent: percent(f64::from(unhealthy_devices), f64::from(total_devices)),
            total_core,
            allocated_core,
            core_percent: percent(allocated_core, total_core),
            has_pending_allocations: ledgers.iter().any(Ledger::has_pending_allocations),
            unit,
            generated_at: Utc::now(),
        }
    }

    pub fn node_rows(ledgers: &[Ledger], unit: Option<MemoryUnit>) -> Vec<NodeSummary> {
        ledgers
            .iter()
            .map(|ledger| NodeSummary {
                name: ledger.name().to_string(),
                address: ledger.address().to_string(),
                roles: NodeRole::join(ledger.roles()),
                status: ledger.status(),
                mode: ledger.mode(),
                total_devices: ledger.total_devices(),
                allocated_devices: ledger.allocated_devices(),
                unhealthy_devices: ledger.unhealthy_device_count(),
                total_memory_gib: to_gib(unit, ledger.total_memory()),
                allocated_memory_gib: to_gib(unit, ledger.allocated_memory()),
                memory_percent: percent(ledger.allocated_memory(), ledger.total_memory()),
                total_core: ledger.total_core(),
                allocated_core: ledger.allocated_core(),
                used_memory_gib: ledger.metric_used_memory().map(|raw| to_gib(unit, raw)),
                duty_cycle: ledger.duty_cycle(),
                has_pending_allocations: ledger.has_pending_allocations(),
            })
            .collect()
    }

    pub fn device_rows(ledgers: &[Ledger], unit: Option<MemoryUnit>) -> Vec<DeviceRow> {
        ledgers
            .iter()
            .flat_map(|ledger| {
                ledger.devices().map(move |device| DeviceRow {
                    node: ledger.name().to_string(),
                    slot: device.slot,
                    total_memory_gib: to_gib(unit, device.total_memory),
                    used_memory_gib: to_gib(unit, device.used_memory),
                    memory_percent: device.utilization() * 100.0,
                    compute_percent: device.used_compute,
                    metric_used_memory_gib: device.metric.as_ref().map(|m| to_gib(unit, m.used_memory)),
                    duty_cycle: device.metric.as_ref().map(|m| m.duty_cycle),
                    pods: device
                        .pods
                        .iter()
                        .map(|pod| PodRef {
                            memory: to_gib(unit, pod.memory),
                            ..pod.clone()
                        })
                        .collect(),
                })
            })
            .collect()
    }
}
