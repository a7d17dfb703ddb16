//! Per-node GPU allocation summary

use crate::commands::Context;
use crate::output::{
    colorize_status, format_devices, format_gib, format_optional, format_percentage, Formattable,
};
use anyhow::Result;
use gputop_ledger::{ClusterSummary, NodeSummary};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct NodeRow<'a>(&'a NodeSummary);

impl Formattable for NodeRow<'_> {
    fn table_headers() -> Vec<String> {
        vec![
            "Name".to_string(),
            "IP Address".to_string(),
            "Role".to_string(),
            "Status".to_string(),
            "Mode".to_string(),
            "GPU(Total)".to_string(),
            "GPU(Allocated)".to_string(),
            "GPU(Unhealthy)".to_string(),
            "GPU Memory(GiB)".to_string(),
        ]
    }

    fn table_row(&self) -> Vec<String> {
        let node = self.0;
        vec![
            node.name.clone(),
            node.address.clone(),
            node.roles.clone(),
            colorize_status(&node.status.to_string()).to_string(),
            node.mode.to_string(),
            node.total_devices.to_string(),
            format_devices(node.allocated_devices),
            node.unhealthy_devices.to_string(),
            memory_cell(node),
        ]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        let node = self.0;
        vec![
            ("Name".to_string(), node.name.clone()),
            ("IP Address".to_string(), node.address.clone()),
            ("Role".to_string(), node.roles.clone()),
            ("Status".to_string(), node.status.to_string()),
            ("Mode".to_string(), node.mode.to_string()),
            ("GPU Total".to_string(), node.total_devices.to_string()),
            ("GPU Allocated".to_string(), format_devices(node.allocated_devices)),
            ("GPU Unhealthy".to_string(), node.unhealthy_devices.to_string()),
            ("GPU Memory (GiB)".to_string(), memory_cell(node)),
            ("GPU Core".to_string(), core_cell(node)),
            ("GPU Memory Used (GiB)".to_string(), format_optional(node.used_memory_gib, format_gib)),
            ("GPU Duty Cycle".to_string(), format_optional(node.duty_cycle, format_percentage)),
        ]
    }
}

fn memory_cell(node: &NodeSummary) -> String {
    let mut cell = format!(
        "{}/{} ({})",
        format_gib(node.allocated_memory_gib),
        format_gib(node.total_memory_gib),
        format_percentage(node.memory_percent)
    );
    if node.has_pending_allocations {
        cell.push_str(" *");
    }
    cell
}

fn core_cell(node: &NodeSummary) -> String {
    if node.total_core <= 0.0 {
        return "-".to_string();
    }
    format!("{}/{}", node.allocated_core, node.total_core)
}

/// Summary lines printed under the node table
pub fn cluster_lines(cluster: &ClusterSummary) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Allocated/Total GPU Memory In Cluster: {}/{} GiB ({})",
            format_gib(cluster.allocated_memory_gib),
            format_gib(cluster.total_memory_gib),
            format_percentage(cluster.memory_percent)
        ),
        format!(
            "Allocated/Total GPUs In Cluster: {}/{} ({})",
            format_devices(cluster.allocated_devices),
            cluster.total_devices,
            format_percentage(cluster.device_percent)
        ),
    ];
    if cluster.total_core > 0.0 {
        lines.push(format!(
            "Allocated/Total GPU Core In Cluster: {}/{} ({})",
            cluster.allocated_core,
            cluster.total_core,
            format_percentage(cluster.core_percent)
        ));
    }
    if cluster.unhealthy_devices > 0 {
        lines.push(format!(
            "Unhealthy/Total GPUs In Cluster: {}/{} ({})",
            cluster.unhealthy_devices,
            cluster.total_devices,
            format_percentage(cluster.unhealthy_percent)
        ));
    }
    lines
}

#[derive(Serialize)]
struct NodesDocument<'a> {
    nodes: &'a [NodeSummary],
    cluster: &'a ClusterSummary,
}

pub async fn list_nodes(ctx: &Context, nodes: &[String]) -> Result<()> {
    let report = ctx.report(nodes).await?;
    let formatter = ctx.formatter();

    if ctx.format.is_structured() {
        return formatter.print_document(&NodesDocument {
            nodes: &report.nodes,
            cluster: &report.cluster,
        });
    }

    let rows: Vec<NodeRow> = report.nodes.iter().map(NodeRow).collect();
    formatter.print_list(&rows)?;
    formatter.print_footer(&cluster_lines(&report.cluster));
    if report.cluster.has_pending_allocations {
        formatter.print_warning("* some GPU memory is allocated but not yet bound to a device");
    }
    Ok(())
}
