//! Cache tiers: memory (L1), remote (L2) and durable (L3).

pub mod durable;
pub mod memory;
pub mod remote;

use serde::{Deserialize, Serialize};

/// Tier identity, used in metrics and lookup results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierLocation {
    Memory,
    Remote,
    Durable,
}

impl std::fmt::Display for TierLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TierLocation::Memory => write!(f, "memory"),
            TierLocation::Remote => write!(f, "remote"),
            TierLocation::Durable => write!(f, "durable"),
        }
    }
}
