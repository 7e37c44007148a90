//! OEE status bands used by dashboards

use serde::{Deserialize, Serialize};

/// OEE at or above this is world class
pub const WORLD_CLASS_THRESHOLD: f64 = 0.85;
/// OEE at or above this is good
pub const GOOD_THRESHOLD: f64 = 0.60;
/// OEE at or above this is average
pub const AVERAGE_THRESHOLD: f64 = 0.40;

/// Classification of a composite OEE value
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OeeStatus {
    WorldClass,
    Good,
    Average,
    Poor,
}

impl OeeStatus {
    /// Classify an OEE ratio (0.0 - 1.0)
    pub fn classify(oee: f64) -> Self {
        if oee >= WORLD_CLASS_THRESHOLD {
            OeeStatus::WorldClass
        } else if oee >= GOOD_THRESHOLD {
            OeeStatus::Good
        } else if oee >= AVERAGE_THRESHOLD {
            OeeStatus::Average
        } else {
            OeeStatus::Poor
        }
    }

    /// Display colour hint for gauges
    pub fn color(&self) -> &'static str {
        match self {
            OeeStatus::WorldClass => "green",
            OeeStatus::Good => "yellow",
            OeeStatus::Average => "orange",
            OeeStatus::Poor => "red",
        }
    }
}

impl std::fmt::Display for OeeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OeeStatus::WorldClass => write!(f, "world class"),
            OeeStatus::Good => write!(f, "good"),
            OeeStatus::Average => write!(f, "average"),
            OeeStatus::Poor => write!(f, "poor"),
        }
    }
}
