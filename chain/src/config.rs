use serde::Deserialize;
use time::UTime;

/// Chain controller configuration.
/// Assumes block_interval >= 1 second and producers_per_round >= 1.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// Seconds between consecutive slots.
    pub block_interval: UTime,
    /// Producers per round; the schedule is recomputed every this many
    /// blocks.
    pub producers_per_round: u32,
    /// Recursion bound when walking delegated account authorities.
    pub max_authority_depth: u32,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            block_interval: 3.into(),
            producers_per_round: 21,
            max_authority_depth: 6,
        }
    }
}

impl ChainConfig {
    /// Producers that must have produced on top of a block before it becomes
    /// irreversible: strictly more than two thirds of the round.
    pub fn irreversibility_threshold(&self) -> usize {
        (self.producers_per_round as usize * 2) / 3 + 1
    }
}
