use ptmc_core::{derive_substream_seed, Rank};

/// Derives the deterministic seed used for the walker on a specific rank.
pub fn replica_seed(master_seed: u64, rank: Rank) -> u64 {
    derive_substream_seed(master_seed, rank as u64)
}

/// Deterministic seed for the uniform draw deciding one exchange proposal.
///
/// The iteration and the pair index are folded in by two chained substream
/// derivations, so neither is truncated.
pub fn exchange_seed(master_seed: u64, iteration: usize, pair_index: usize) -> u64 {
    let per_iteration =
        derive_substream_seed(master_seed ^ 0xA5A5_A5A5_A5A5_A5A5, iteration as u64);
    derive_substream_seed(per_iteration, pair_index as u64)
}
