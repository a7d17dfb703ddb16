//! # gputop-core
//!
//! Shared data model, configuration and error handling for gputop, a GPU
//! device accounting tool for Kubernetes clusters.
//!
//! This crate provides:
//!
//! - The immutable cluster snapshot (nodes, pods, containers)
//! - Resource and annotation names used to interpret the snapshot
//! - The `ClusterSource` trait external inventory providers implement
//! - Configuration schema and loading
//! - Error handling types and utilities

pub mod config;
pub mod error;
pub mod resources;
pub mod snapshot;
pub mod traits;
pub mod types;

// Re-export commonly used types at the crate root
pub use config::{AccountingConfig, Config, ObservabilityConfig, SnapshotConfig};
pub use error::{Error, Result};
pub use resources::ResourceNames;
pub use snapshot::{ClusterSnapshot, Container, DeviceMetric, Node, Pod};
pub use traits::ClusterSource;
pub use types::{GpuMode, NodeRole, NodeStatus, PodPhase, PodScope};
