//! Memory unit detection
//!
//! Device plugins report GPU memory either in MiB or in GiB without saying
//! which. The unit is inferred from the first node with memory: more than
//! [`MIB_PER_DEVICE_THRESHOLD`] whole units per device can only be MiB. Once inferred the
//! unit is sticky for the lifetime of the resolver.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Per-device memory above which raw figures are taken to be MiB
pub const MIB_PER_DEVICE_THRESHOLD: f64 = 100.0;

const MIB_PER_GIB: f64 = 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryUnit {
    MiB,
    GiB,
}

impl MemoryUnit {
    pub fn symbol(&self) -> &'static str {
        match self {
            MemoryUnit::MiB => "MiB",
            MemoryUnit::GiB => "GiB",
        }
    }

    /// Convert a raw figure in this unit to GiB
    pub fn to_gib(&self, raw: f64) -> f64 {
        match self {
            MemoryUnit::MiB => raw / MIB_PER_GIB,
            MemoryUnit::GiB => raw,
        }
    }
}

impl fmt::Display for MemoryUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Convert with an optional unit; unresolved figures pass through raw
pub fn to_gib(unit: Option<MemoryUnit>, raw: f64) -> f64 {
    unit.map(|u| u.to_gib(raw)).unwrap_or(raw)
}

/// Sticky MiB/GiB inference
#[derive(Debug, Clone, Default)]
pub struct UnitResolver {
    unit: Option<MemoryUnit>,
}

impl UnitResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Infer the unit from one node's memory and device count
    ///
    /// Returns the cached unit without looking at the arguments once a unit
    /// is known. A zero device count leaves the resolver untouched.
    pub fn resolve(&mut self, total_memory_raw: f64, device_count: u32) -> Option<MemoryUnit> {
        if self.unit.is_some() || device_count == 0 {
            return self.unit;
        }

        // Whole units per device, remainder dropped
        let per_device = total_memory_raw.max(0.0).trunc() as u64 / u64::from(device_count);
        let unit = if per_device as f64 > MIB_PER_DEVICE_THRESHOLD {
            MemoryUnit::MiB
        } else {
            MemoryUnit::GiB
        };

        debug!(per_device, unit = %unit, "Resolved GPU memory unit");
        self.unit = Some(unit);
        self.unit
    }

    pub fn unit(&self) -> Option<MemoryUnit> {
        self.unit
    }

    pub fn is_resolved(&self) -> bool {
        self.unit.is_some()
    }

    pub fn reset(&mut self) {
        self.unit = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold() {
        let mut resolver = UnitResolver::new();
        assert_eq!(resolver.resolve(60.0, 4), Some(MemoryUnit::GiB));

        resolver.reset();
        assert_eq!(resolver.resolve(4.0 * 16384.0, 4), Some(MemoryUnit::MiB));

        // exactly at the threshold is still GiB
        resolver.reset();
        assert_eq!(resolver.resolve(400.0, 4), Some(MemoryUnit::GiB));
    }

    #[test]
    fn test_per_device_share_drops_remainder() {
        let mut resolver = UnitResolver::new();
        assert_eq!(resolver.resolve(401.0, 4), Some(MemoryUnit::GiB));

        resolver.reset();
        assert_eq!(resolver.resolve(403.9, 4), Some(MemoryUnit::GiB));

        resolver.reset();
        assert_eq!(resolver.resolve(404.0, 4), Some(MemoryUnit::MiB));
    }

    #[test]
    fn test_unit_is_sticky() {
        let mut resolver = UnitResolver::new();
        assert_eq!(resolver.resolve(60.0, 4), Some(MemoryUnit::GiB));
        assert_eq!(resolver.resolve(65536.0, 4), Some(MemoryUnit::GiB));
        assert_eq!(resolver.unit(), Some(MemoryUnit::GiB));
    }

    #[test]
    fn test_zero_devices_is_noop() {
        let mut resolver = UnitResolver::new();
        assert_eq!(resolver.resolve(65536.0, 0), None);
        assert!(!resolver.is_resolved());
        assert_eq!(resolver.resolve(65536.0, 4), Some(MemoryUnit::MiB));
    }

    #[test]
    fn test_conversion() {
        assert_eq!(MemoryUnit::MiB.to_gib(16384.0), 16.0);
        assert_eq!(MemoryUnit::GiB.to_gib(15.0), 15.0);
        assert_eq!(to_gib(None, 7.5), 7.5);
        assert_eq!(MemoryUnit::MiB.to_string(), "MiB");
    }
}
