//! # gputop-ledger
//!
//! GPU device accounting for a cluster snapshot.
//!
//! This crate provides:
//! - Sticky MiB/GiB unit detection for device memory figures
//! - Device binding resolution from share scheduler allocations
//! - Fractional memory/compute accounting with the whole-device override
//! - Whole-device binding on topology-aware nodes
//! - Per-node device ledgers and cluster-wide aggregation
//! - A job registry reporting GPU usage per multi-pod job
//!
//! ## Example
//!
//! ```rust
//! use gputop_core::{ClusterSnapshot, Container, Node, Pod};
//! use gputop_core::resources::{DEVICE_INDEX_ANNOTATION, GPU_SHARE_COUNT, GPU_SHARE_MEMORY};
//! use gputop_ledger::AccountingEngine;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let node = Node::new("gpu-node")
//!     .with_resource(GPU_SHARE_MEMORY, 60.0)
//!     .with_resource(GPU_SHARE_COUNT, 4.0);
//! let pod = Pod::new("default", "binpack-0")
//!     .on_node("gpu-node")
//!     .with_annotation(DEVICE_INDEX_ANNOTATION, "3")
//!     .with_container(Container::new("main").with_limit(GPU_SHARE_MEMORY, 3.0));
//!
//! let mut engine = AccountingEngine::with_defaults();
//! let report = engine.run(&ClusterSnapshot::new(vec![node], vec![pod]))?;
//!
//! assert_eq!(report.cluster.allocated_memory_gib, 3.0);
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

pub mod allocation;
pub mod engine;
pub mod fractional;
pub mod jobs;
pub mod ledger;
pub mod report;
pub mod slot;
pub mod source;
pub mod topology;
pub mod unit;

// Re-export commonly used types
pub use allocation::DeviceAllocationResolver;
pub use engine::AccountingEngine;
pub use fractional::{FractionalGpuAccountant, PodAccount};
pub use jobs::{Job, JobCapabilities, JobKind, JobRegistry, JobStatus};
pub use ledger::{Device, Ledger, LedgerState, PodRef};
pub use report::{percent, AggregationReporter, ClusterSummary, DeviceRow, NodeSummary, Report};
pub use slot::DeviceSlot;
pub use source::{FileSource, StaticSource};
pub use topology::TopologyAllocationResolver;
pub use unit::{MemoryUnit, UnitResolver};

/// Result type for accounting operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur during an accounting pass
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Errors from the snapshot model or the cluster source, passed through as is
    #[error(transparent)]
    Core(#[from] gputop_core::Error),

    #[error("Ledger for node {node} is sealed")]
    Sealed { node: String },
}
