//! Seed extraction
//!
//! Turns query sequences into [`QuerySeed`]s for one shard.
//!
//! ## Selection
//!
//! For every sequence, all valid pattern windows are encoded (nucleotides in
//! canonical form), ranked by a seeded hash of the k-mer value with the
//! window position as tie-break, repeats of a k-mer value inside the
//! sequence are dropped, and the first `kmers_per_sequence` survive (0 keeps
//! all). Only then is the shard filter `value % shards == shard` applied, so
//! the seeds of all shards together are exactly the unsharded seed set.
//!
//! ## Parallelism
//!
//! Two passes over the sequences, both parallel with per-thread scratch:
//! the first counts the seeds each sequence contributes, an exclusive prefix
//! sum turns the counts into disjoint ranges of the shard buffer, and the
//! second fills those ranges.

use rayon::prelude::*;
use tracing::{debug, warn};

use super::config::CapacityPolicy;
use super::seeds::{QuerySeed, SeedBuffer};
use crate::encoding::Alphabet;
use crate::error::{Result, SearchError};
use crate::hasher::KmerRanker;
use crate::kmer::{KmerPattern, StrandedKmer};
use crate::sequences::SequenceSource;

/// Which slice of the k-mer space a pass handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardAssignment {
    /// Index of this shard
    pub shard: usize,
    /// Total number of shards
    pub shards: usize,
}

impl ShardAssignment {
    /// The whole k-mer space
    pub fn single() -> Self {
        Self { shard: 0, shards: 1 }
    }

    /// Whether a k-mer value belongs to this shard
    #[inline]
    pub fn contains(&self, value: u64) -> bool {
        self.shards <= 1 || value % self.shards as u64 == self.shard as u64
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    rank: u64,
    pos: usize,
    kmer: StrandedKmer,
}

/// Upper bound on the seeds extracted from `queries`: the number of
/// windows per sequence, capped at `kmers_per_sequence` when non-zero.
pub fn estimate_total_seeds<S: SequenceSource + ?Sized>(
    queries: &S,
    pattern: &KmerPattern,
    kmers_per_sequence: usize,
) -> usize {
    (0..queries.len())
        .into_par_iter()
        .map(|i| {
            let windows = pattern.num_windows(queries.sequence(i).len());
            if kmers_per_sequence == 0 {
                windows
            } else {
                windows.min(kmers_per_sequence)
            }
        })
        .sum()
}

/// Extracts ranked, de-duplicated seeds from query sequences
pub struct SeedExtractor<'a> {
    pattern: &'a KmerPattern,
    alphabet: &'a Alphabet,
    ranker: KmerRanker,
    kmers_per_sequence: usize,
}

impl<'a> SeedExtractor<'a> {
    /// Extractor over `pattern` windows; `kmers_per_sequence = 0` keeps all
    pub fn new(
        pattern: &'a KmerPattern,
        alphabet: &'a Alphabet,
        ranker: KmerRanker,
        kmers_per_sequence: usize,
    ) -> Self {
        Self {
            pattern,
            alphabet,
            ranker,
            kmers_per_sequence,
        }
    }

    fn select(&self, seq: &[u8], scratch: &mut Vec<Candidate>) {
        scratch.clear();
        scratch.extend(self.pattern.kmers(seq, self.alphabet).map(|(pos, kmer)| Candidate {
            rank: self.ranker.rank(kmer.value),
            pos,
            kmer,
        }));
        // The value sits between rank and position so equal values stay
        // adjacent even if two values collide on rank
        scratch.sort_unstable_by_key(|c| (c.rank, c.kmer.value, c.pos));
        scratch.dedup_by_key(|c| c.kmer.value);
        if self.kmers_per_sequence > 0 {
            scratch.truncate(self.kmers_per_sequence);
        }
    }

    /// Selected k-mers of one sequence, in rank order, before shard filtering
    pub fn select_kmers(&self, seq: &[u8]) -> Vec<(usize, StrandedKmer)> {
        let mut scratch = Vec::new();
        self.select(seq, &mut scratch);
        scratch.into_iter().map(|c| (c.pos, c.kmer)).collect()
    }

    /// Fill `buffer` with the seeds of `queries` that fall into `shard`.
    ///
    /// Returns the number of seeds written. The buffer is never truncated:
    /// an overrun either grows it or fails, according to `policy`.
    pub fn extract<S: SequenceSource + ?Sized>(
        &self,
        queries: &S,
        shard: ShardAssignment,
        buffer: &mut SeedBuffer,
        policy: CapacityPolicy,
    ) -> Result<usize> {
        let counts: Vec<usize> = (0..queries.len())
            .into_par_iter()
            .map_init(Vec::new, |scratch, i| {
                self.select(queries.sequence(i), scratch);
                scratch
                    .iter()
                    .filter(|c| shard.contains(c.kmer.value))
                    .count()
            })
            .collect();
        let total: usize = counts.iter().sum();

        if total > buffer.max_seeds() {
            match policy {
                CapacityPolicy::Fail => {
                    return Err(SearchError::CapacityExceeded {
                        needed: total + 1,
                        capacity: buffer.capacity(),
                    })
                }
                CapacityPolicy::Grow => {
                    warn!(
                        "Shard {}/{}: {} seeds exceed buffer capacity {}, growing",
                        shard.shard + 1,
                        shard.shards,
                        total,
                        buffer.capacity()
                    );
                    buffer.grow_to(total);
                }
            }
        }

        // Disjoint output range per sequence
        let mut ranges: Vec<&mut [QuerySeed]> = Vec::with_capacity(counts.len());
        let mut rest = buffer.reset_len(total);
        for &count in &counts {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(count);
            ranges.push(head);
            rest = tail;
        }

        ranges
            .into_par_iter()
            .enumerate()
            .for_each_init(Vec::new, |scratch, (i, out)| {
                let seq = queries.sequence(i);
                let id = queries.key(i);
                let seq_len = seq.len() as u32;
                self.select(seq, scratch);
                let selected = scratch.iter().filter(|c| shard.contains(c.kmer.value));
                for (slot, c) in out.iter_mut().zip(selected) {
                    *slot = QuerySeed {
                        kmer: c.kmer,
                        id,
                        pos: c.pos as i32,
                        seq_len,
                    };
                }
            });

        debug!(
            "Shard {}/{}: extracted {} seeds from {} sequences",
            shard.shard + 1,
            shard.shards,
            total,
            queries.len()
        );
        Ok(total)
    }
}
