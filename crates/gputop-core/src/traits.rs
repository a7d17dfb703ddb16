//! Boundary traits for gputop
//!
//! The accounting engine never talks to a cluster itself. Whatever supplies
//! nodes and pods (an API client, a recorded snapshot, a test fixture)
//! implements `ClusterSource`.

use crate::{Node, Pod, PodScope, Result};
use async_trait::async_trait;

/// Supplies the node and pod inventory for one accounting pass
#[async_trait]
pub trait ClusterSource: Send + Sync {
    /// List every node in the cluster
    async fn list_nodes(&self) -> Result<Vec<Node>>;

    /// List pods restricted to `scope`
    async fn list_pods(&self, scope: &PodScope) -> Result<Vec<Pod>>;

    /// Short human-readable description, used in log lines
    fn describe(&self) -> String {
        "cluster".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    struct Unreachable;

    #[async_trait]
    impl ClusterSource for Unreachable {
        async fn list_nodes(&self) -> Result<Vec<Node>> {
            Err(Error::fetch("connection refused"))
        }

        async fn list_pods(&self, _scope: &PodScope) -> Result<Vec<Pod>> {
            Ok(vec![Pod::new("default", "idle")])
        }
    }

    #[tokio::test]
    async fn test_source_trait_object() {
        let source: Box<dyn ClusterSource> = Box::new(Unreachable);
        assert_eq!(source.describe(), "cluster");
        assert!(source.list_nodes().await.is_err());
        assert_eq!(source.list_pods(&PodScope::all()).await.unwrap().len(), 1);
    }
}
