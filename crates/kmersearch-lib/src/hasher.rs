//! Deterministic k-mer ranking for top-N seed selection.
//!
//! Each k-mer value is mapped to a pseudo-random rank with a seeded
//! `AHasher`. Keeping the N lowest ranks per sequence picks the same k-mers
//! in every sequence that contains them, which is what lets two similar
//! sequences share seeds even when only a few are kept.

use ahash::RandomState;
use std::hash::{BuildHasher, Hasher};

use crate::constants::DEFAULT_SEED;

/// Seeded hash used to rank k-mers
#[derive(Clone)]
pub struct KmerRanker {
    seed: u64,
    state: RandomState,
}

impl Default for KmerRanker {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl KmerRanker {
    /// Create a ranker with the given seed
    pub fn new(seed: u64) -> Self {
        let state = RandomState::with_seeds(seed, !seed, seed.rotate_left(32), !seed.rotate_left(32));
        Self { seed, state }
    }

    /// Rank of a k-mer value; lower ranks are preferred
    #[inline]
    pub fn rank(&self, kmer_value: u64) -> u64 {
        let mut hasher = self.state.build_hasher();
        hasher.write_u64(kmer_value);
        hasher.finish()
    }

    /// Seed the ranker was built with
    pub fn seed(&self) -> u64 {
        self.seed
    }
}
