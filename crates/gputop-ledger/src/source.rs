//! Cluster sources backed by recorded snapshots

use async_trait::async_trait;
use gputop_core::snapshot::is_json_path;
use gputop_core::{ClusterSnapshot, ClusterSource, Error, Node, Pod, PodScope};
use std::path::PathBuf;
use tracing::debug;

/// Serves a snapshot held in memory
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    snapshot: ClusterSnapshot,
}

impl StaticSource {
    pub fn new(snapshot: ClusterSnapshot) -> Self {
        Self { snapshot }
    }
}

fn scoped_pods(pods: Vec<Pod>, scope: &PodScope) -> Vec<Pod> {
    pods.into_iter()
        .filter(|pod| scope.matches(&pod.namespace, pod.node_name.as_deref()))
        .collect()
}

#[async_trait]
impl ClusterSource for StaticSource {
    async fn list_nodes(&self) -> gputop_core::Result<Vec<Node>> {
        Ok(self.snapshot.nodes.clone())
    }

    async fn list_pods(&self, scope: &PodScope) -> gputop_core::Result<Vec<Pod>> {
        Ok(scoped_pods(self.snapshot.pods.clone(), scope))
    }

    fn describe(&self) -> String {
        "in-memory snapshot".to_string()
    }
}

/// Reads a YAML or JSON snapshot file on every call
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> gputop_core::Result<ClusterSnapshot> {
        debug!(path = %self.path.display(), "Reading snapshot");
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::fetch(format!("{}: {}", self.path.display(), e)))?;
        ClusterSnapshot::parse(&content, is_json_path(&self.path))
    }
}

#[async_trait]
impl ClusterSource for FileSource {
    async fn list_nodes(&self) -> gputop_core::Result<Vec<Node>> {
        Ok(self.load().await?.nodes)
    }

    async fn list_pods(&self, scope: &PodScope) -> gputop_core::Result<Vec<Pod>> {
        Ok(scoped_pods(self.load().await?.pods, scope))
    }

    fn describe(&self) -> String {
        format!("snapshot file {}", self.path.display())
    }
}
