use serde::{Deserialize, Serialize};

/// Votable static chain parameters. Each active producer publishes its
/// preferred values; the applied configuration is the per-field median of
/// the active set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockchainConfiguration {
    /// Hard cap on the compact-serialized block size, in bytes.
    pub max_block_size: u32,
    /// Soft cap targeted by block generation.
    pub target_block_size: u32,
    /// Maximum seconds between now and a transaction's expiration.
    pub max_transaction_lifetime: u32,
    /// Per-block producer payment, in the smallest token unit.
    pub producer_pay: u64,
}

impl Default for BlockchainConfiguration {
    fn default() -> Self {
        BlockchainConfiguration {
            max_block_size: 1024 * 1024,
            target_block_size: 512 * 1024,
            max_transaction_lifetime: 60 * 60,
            producer_pay: 0,
        }
    }
}

fn median_by<T: Ord + Copy>(votes: &[BlockchainConfiguration], get: impl Fn(&BlockchainConfiguration) -> T) -> T {
    let mut values: Vec<T> = votes.iter().map(get).collect();
    values.sort_unstable();
    values[values.len() / 2]
}

impl BlockchainConfiguration {
    /// Per-field median of a non-empty set of producer votes.
    pub fn median(votes: &[BlockchainConfiguration]) -> Option<BlockchainConfiguration> {
        if votes.is_empty() {
            return None;
        }
        Some(BlockchainConfiguration {
            max_block_size: median_by(votes, |c| c.max_block_size),
            target_block_size: median_by(votes, |c| c.target_block_size),
            max_transaction_lifetime: median_by(votes, |c| c.max_transaction_lifetime),
            producer_pay: median_by(votes, |c| c.producer_pay),
        })
    }
}
