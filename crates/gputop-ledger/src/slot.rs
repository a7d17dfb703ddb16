//! Device slot addressing

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a unit of GPU usage is attributed on a node
///
/// `Pending` collects usage whose device could not be resolved. It orders
/// after every resolved index and serializes as `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "i64", from = "i64")]
pub enum DeviceSlot {
    Resolved(u32),
    Pending,
}

impl DeviceSlot {
    pub fn index(&self) -> Option<u32> {
        match self {
            DeviceSlot::Resolved(index) => Some(*index),
            DeviceSlot::Pending => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, DeviceSlot::Pending)
    }
}

impl From<u32> for DeviceSlot {
    fn from(index: u32) -> Self {
        DeviceSlot::Resolved(index)
    }
}

impl From<i64> for DeviceSlot {
    fn from(value: i64) -> Self {
        u32::try_from(value)
            .map(DeviceSlot::Resolved)
            .unwrap_or(DeviceSlot::Pending)
    }
}

impl From<DeviceSlot> for i64 {
    fn from(slot: DeviceSlot) -> Self {
        match slot {
            DeviceSlot::Resolved(index) => i64::from(index),
            DeviceSlot::Pending => -1,
        }
    }
}

impl FromStr for DeviceSlot {
    type Err = std::num::ParseIntError;

    /// Parse a device index as written in binding annotations
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(DeviceSlot::from)
    }
}

impl fmt::Display for DeviceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSlot::Resolved(index) => write!(f, "{}", index),
            DeviceSlot::Pending => write!(f, "pending"),
        }
    }
}
