//! Per-job GPU usage

use crate::commands::Context;
use crate::output::{colorize_status, Formattable};
use anyhow::Result;
use gputop_core::{Node, PodScope};
use gputop_ledger::{Job, JobCapabilities, JobRegistry, JobStatus};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRow {
    pub name: String,
    pub namespace: String,
    pub kind: String,
    pub status: JobStatus,
    pub requested_gpu: u64,
    pub allocated_gpu: u64,
    pub pods: usize,
    pub chief_host_ip: String,
}

impl JobRow {
    pub fn new(job: &Job, nodes: &[Node]) -> Self {
        Self {
            name: job.name.clone(),
            namespace: job.namespace.clone(),
            kind: job.kind.clone(),
            status: job.status(),
            requested_gpu: job.requested_gpu(),
            allocated_gpu: job.allocated_gpu(),
            pods: job.all_pods().len(),
            chief_host_ip: job.chief_host_ip(nodes),
        }
    }
}

impl Formattable for JobRow {
    fn table_headers() -> Vec<String> {
        vec![
            "Name".to_string(),
            "Namespace".to_string(),
            "Kind".to_string(),
            "Status".to_string(),
            "GPU(Requested)".to_string(),
            "GPU(Allocated)".to_string(),
            "Node".to_string(),
        ]
    }

    fn table_row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.namespace.clone(),
            self.kind.clone(),
            colorize_status(&self.status.to_string()).to_string(),
            self.requested_gpu.to_string(),
            self.allocated_gpu.to_string(),
            self.chief_host_ip.clone(),
        ]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        vec![
            ("Name".to_string(), self.name.clone()),
            ("Namespace".to_string(), self.namespace.clone()),
            ("Kind".to_string(), self.kind.clone()),
            ("Status".to_string(), self.status.to_string()),
            ("GPU Requested".to_string(), self.requested_gpu.to_string()),
            ("GPU Allocated".to_string(), self.allocated_gpu.to_string()),
            ("Pods".to_string(), self.pods.to_string()),
            ("Node".to_string(), self.chief_host_ip.clone()),
        ]
    }
}

/// Totals printed under the job table
pub fn job_lines(rows: &[JobRow]) -> Vec<String> {
    let requested: u64 = rows.iter().map(|r| r.requested_gpu).sum();
    let allocated: u64 = rows.iter().map(|r| r.allocated_gpu).sum();
    vec![
        format!("Total Allocated GPUs of Training Jobs: {}", allocated),
        format!("Total Requested GPUs of Training Jobs: {}", requested),
    ]
}

pub async fn list_jobs(ctx: &Context, namespace: Option<String>) -> Result<()> {
    let scope = match namespace.or_else(|| ctx.config.accounting.namespace.clone()) {
        Some(ns) => PodScope::all().with_namespace(ns),
        None => PodScope::all(),
    };
    let (nodes, pods) = ctx.inventory(&scope).await?;

    let registry = JobRegistry::new(ctx.config.resources.clone());
    let rows: Vec<JobRow> = registry
        .index(&pods)
        .iter()
        .map(|job| JobRow::new(job, &nodes))
        .collect();

    let formatter = ctx.formatter();
    formatter.print_list(&rows)?;
    if !rows.is_empty() {
        formatter.print_footer(&job_lines(&rows));
    }
    Ok(())
}
