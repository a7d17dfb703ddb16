//! Command implementations for gputop

pub mod devices;
pub mod jobs;
pub mod nodes;

use crate::output::{OutputFormat, OutputFormatter};
use anyhow::{Context as _, Result};
use gputop_core::{ClusterSource, Config, Node, Pod, PodScope};
use gputop_ledger::{AccountingEngine, FileSource, Report};
use std::path::PathBuf;
use tracing::debug;

/// Everything a command needs: configuration, input and output format
pub struct Context {
    pub config: Config,
    pub snapshot: PathBuf,
    pub format: OutputFormat,
}

impl Context {
    pub fn new(config: Config, snapshot: Option<PathBuf>, format: OutputFormat) -> Result<Self> {
        let snapshot = snapshot
            .or_else(|| config.snapshot.path.clone())
            .context("No snapshot file given; pass --snapshot or set snapshot.path")?;
        Ok(Self {
            config,
            snapshot,
            format,
        })
    }

    pub fn formatter(&self) -> OutputFormatter {
        OutputFormatter::new(self.format)
    }

    fn source(&self) -> FileSource {
        FileSource::new(&self.snapshot)
    }

    /// Run an accounting pass over the snapshot, restricted to `nodes`
    pub async fn report(&self, nodes: &[String]) -> Result<Report> {
        let formatter = self.formatter();
        formatter.print_progress("Accounting GPU allocations");

        let mut engine = AccountingEngine::new(&self.config);
        let scope = engine.scope();
        let result = engine.collect(&self.source(), &scope).await;
        formatter.clear_progress();

        let mut report =
            result.with_context(|| format!("Failed to account snapshot {}", self.snapshot.display()))?;
        report.retain_nodes(nodes);
        debug!(nodes = report.nodes.len(), "Report ready");
        Ok(report)
    }

    /// Raw inventory, for views that do not need device accounting
    pub async fn inventory(&self, scope: &PodScope) -> Result<(Vec<Node>, Vec<Pod>)> {
        let source = self.source();
        let nodes = source
            .list_nodes()
            .await
            .with_context(|| format!("Failed to read nodes from {}", source.describe()))?;
        let pods = source
            .list_pods(scope)
            .await
            .with_context(|| format!("Failed to read pods from {}", source.describe()))?;
        Ok((nodes, pods))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_requires_snapshot() {
        assert!(Context::new(Config::default(), None, OutputFormat::Table).is_err());

        let mut config = Config::default();
        config.snapshot.path = Some(PathBuf::from("/tmp/cluster.yaml"));
        let ctx = Context::new(config, None, OutputFormat::Json).unwrap();
        assert_eq!(ctx.snapshot, PathBuf::from("/tmp/cluster.yaml"));
    }

    #[tokio::test]
    async fn test_report_from_snapshot_file() {
        let (_dir, path) = fixtures::snapshot_file();
        let ctx = Context::new(Config::default(), Some(path), OutputFormat::Json).unwrap();

        let report = ctx.report(&[]).await.unwrap();
        assert_eq!(report.nodes.len(), 2);
        assert_eq!(report.cluster.allocated_memory_gib, 8.0);

        let report = ctx.report(&["v100".to_string()]).await.unwrap();
        assert_eq!(report.nodes.len(), 1);
        assert_eq!(report.cluster.allocated_devices, 2.0);
    }

    #[tokio::test]
    async fn test_missing_snapshot_fails() {
        let ctx = Context::new(
            Config::default(),
            Some(PathBuf::from("/nonexistent/cluster.yaml")),
            OutputFormat::Json,
        )
        .unwrap();
        assert!(ctx.report(&[]).await.is_err());
    }
}
