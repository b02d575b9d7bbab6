//! Shared primitive types used across the entire simulation.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Virtual simulation time in seconds.
pub type SimTime = f64;

/// The canonical run identifier.
pub type RunId = String;

/// A stable, human-readable sample identifier.
pub type SampleId = String;

/// Handle to a process owned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProcessId(pub usize);

/// Handle to a [`Resource`](crate::resource::Resource) registered with the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub usize);

/// Handle to a [`DepletableResource`](crate::depletable::DepletableResource)
/// registered with the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoreId(pub usize);

/// Urgency of a scheduling entry, resource request or queued item.
///
/// ORDER: Critical < Important < Normal. The smaller value is served first,
/// both on the event timeline and in every wait list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    Important,
    #[default]
    Normal,
}

impl Priority {
    /// Rank used for ordering. Never derive this from declaration order.
    pub fn rank(self) -> u8 {
        match self {
            Self::Critical  => 0,
            Self::Important => 1,
            Self::Normal    => 2,
        }
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Tolerance used when comparing fractional quantities against capacities.
pub const QUANTITY_EPSILON: f64 = 1e-9;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_sorts_before_normal() {
        let mut levels = vec![Priority::Normal, Priority::Critical, Priority::Important];
        levels.sort();
        assert_eq!(levels, vec![Priority::Critical, Priority::Important, Priority::Normal]);
    }
}
