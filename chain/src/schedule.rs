//! Producer round maintenance: selection of the top-voted producers and the
//! deterministic per-round shuffle.

use crypto::hash::Hash;
use models::AccountName;
use rand::seq::SliceRandom;
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use statedb::StateDb;

/// Active set for the next round: producers ordered by (votes desc, name
/// asc), truncated to `count`.
pub fn top_voted_producers(db: &StateDb, count: usize) -> Vec<AccountName> {
    let mut producers: Vec<(u64, AccountName)> = db
        .producers()
        .map(|producer| (producer.total_votes, producer.owner.clone()))
        .collect();
    producers.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    producers
        .into_iter()
        .take(count)
        .map(|(_, owner)| owner)
        .collect()
}

/// Deterministically shuffle a round. The seed is the id of the last block
/// of the prior round, so every node computes the same order.
pub fn shuffled_round(seed: &Hash, mut round: Vec<AccountName>) -> Vec<AccountName> {
    let mut rng = Xoshiro256PlusPlus::from_seed(seed.to_bytes());
    round.shuffle(&mut rng);
    round
}
