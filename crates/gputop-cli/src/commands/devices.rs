//! Per-device detail

use crate::commands::Context;
use crate::output::{format_gib, format_optional, format_percentage, Formattable};
use anyhow::Result;
use gputop_ledger::DeviceRow;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct DeviceLine<'a>(&'a DeviceRow);

impl DeviceLine<'_> {
    fn pods(&self) -> String {
        if self.0.pods.is_empty() {
            return "-".to_string();
        }
        self.0
            .pods
            .iter()
            .map(|pod| format!("{}/{} ({} GiB)", pod.namespace, pod.name, format_gib(pod.memory)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn percent(&self) -> String {
        if self.0.slot.is_pending() {
            "-".to_string()
        } else {
            format_percentage(self.0.memory_percent)
        }
    }
}

impl Formattable for DeviceLine<'_> {
    fn table_headers() -> Vec<String> {
        vec![
            "Node".to_string(),
            "GPU".to_string(),
            "Memory(GiB)".to_string(),
            "Memory%".to_string(),
            "Compute%".to_string(),
            "Used(Metric)".to_string(),
            "Duty Cycle".to_string(),
            "Pods".to_string(),
        ]
    }

    fn table_row(&self) -> Vec<String> {
        let device = self.0;
        vec![
            device.node.clone(),
            device.slot.to_string(),
            format!("{}/{}", format_gib(device.used_memory_gib), format_gib(device.total_memory_gib)),
            self.percent(),
            device.compute_percent.to_string(),
            format_optional(device.metric_used_memory_gib, format_gib),
            format_optional(device.duty_cycle, format_percentage),
            self.pods(),
        ]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        let device = self.0;
        vec![
            ("Node".to_string(), device.node.clone()),
            ("GPU".to_string(), device.slot.to_string()),
            ("Memory Used (GiB)".to_string(), format_gib(device.used_memory_gib)),
            ("Memory Total (GiB)".to_string(), format_gib(device.total_memory_gib)),
            ("Memory Percent".to_string(), self.percent()),
            ("Compute Percent".to_string(), device.compute_percent.to_string()),
            (
                "Memory Used by Metric (GiB)".to_string(),
                format_optional(device.metric_used_memory_gib, format_gib),
            ),
            ("Duty Cycle".to_string(), format_optional(device.duty_cycle, format_percentage)),
            ("Pods".to_string(), self.pods().replace('\n', ", ")),
        ]
    }
}

pub async fn list_devices(ctx: &Context, nodes: &[String]) -> Result<()> {
    let report = ctx.report(nodes).await?;
    let formatter = ctx.formatter();

    if ctx.format.is_structured() {
        return formatter.print_document(&report.devices);
    }

    let lines: Vec<DeviceLine> = report.devices.iter().map(DeviceLine).collect();
    formatter.print_list(&lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gputop_ledger::{DeviceSlot, PodRef};

    fn row(slot: DeviceSlot) -> DeviceRow {
        DeviceRow {
            node: "gpu-node".to_string(),
            slot,
            total_memory_gib: 15.0,
            used_memory_gib: 14.0,
            memory_percent: 14.0 / 15.0 * 100.0,
            compute_percent: 30,
            metric_used_memory_gib: None,
            duty_cycle: None,
            pods: vec![
                PodRef {
                    namespace: "default".to_string(),
                    name: "a".to_string(),
                    memory: 6.0,
                    compute: 0,
                },
                PodRef {
                    namespace: "default".to_string(),
                    name: "b".to_string(),
                    memory: 8.0,
                    compute: 30,
                },
            ],
        }
    }

    #[test]
    fn test_device_line() {
        let row = row(DeviceSlot::Resolved(3));
        let line = DeviceLine(&row);
        let cells = line.table_row();

        assert_eq!(cells.len(), DeviceLine::table_headers().len());
        assert_eq!(cells[1], "3");
        assert_eq!(cells[2], "14.0/15.0");
        assert_eq!(cells[3], "93.3%");
        assert_eq!(cells[5], "-");
        assert_eq!(cells[7], "default/a (6.0 GiB)\ndefault/b (8.0 GiB)");
    }

    #[test]
    fn test_device_line_with_metrics() {
        let mut row = row(DeviceSlot::Resolved(0));
        row.metric_used_memory_gib = Some(12.5);
        row.duty_cycle = Some(87.0);
        let cells = DeviceLine(&row).table_row();
        assert_eq!(cells[5], "12.5");
        assert_eq!(cells[6], "87.0%");
    }

    #[test]
    fn test_pending_line() {
        let row = row(DeviceSlot::Pending);
        let pairs = DeviceLine(&row).key_value_pairs();
        assert_eq!(pairs[1].1, "pending");
        assert_eq!(pairs[4].1, "-");
        assert_eq!(pairs[8].1, "default/a (6.0 GiB), default/b (8.0 GiB)");
    }

    #[test]
    fn test_serializes_as_row() {
        let row = row(DeviceSlot::Pending);
        let json = serde_json::to_value(DeviceLine(&row)).unwrap();
        assert_eq!(json["slot"], -1);
    }
}
