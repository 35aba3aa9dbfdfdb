//! Seed and match records and their buffers
//!
//! A shard owns two buffers in sequence: a [`SeedBuffer`] of query seeds,
//! filled by extraction and sorted for the join, and the `Vec<SeedMatch>`
//! the join produces from it. The seed buffer is dropped before the matches
//! are written.

use rayon::prelude::*;

use crate::kmer::{SeqType, Strand, StrandedKmer};

/// One query k-mer occurrence (pre-join)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuerySeed {
    /// Canonical k-mer and the strand it was read from
    pub kmer: StrandedKmer,
    /// Query sequence identifier
    pub id: u32,
    /// Forward-strand window start
    pub pos: i32,
    /// Query sequence length
    pub seq_len: u32,
}

impl QuerySeed {
    const EMPTY: QuerySeed = QuerySeed {
        kmer: StrandedKmer {
            value: 0,
            strand: Strand::Forward,
        },
        id: 0,
        pos: 0,
        seq_len: 0,
    };

    /// Sort key: (k-mer key, id, position)
    #[inline]
    pub fn sort_key(&self, seq_type: SeqType) -> (u64, u32, i32) {
        (self.kmer.comparison_key(seq_type), self.id, self.pos)
    }
}

/// One seed shared by a query and a target (post-join)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeedMatch {
    /// Target sequence identifier
    pub target_id: u32,
    /// Query and target matched on opposite strands
    pub inverted: bool,
    /// Query sequence identifier
    pub query_id: u32,
    /// Estimated alignment diagonal
    pub diagonal: i32,
}

impl SeedMatch {
    /// Packed size in temp shard files
    pub const SERIALIZED_SIZE: usize = 13;

    /// Total order used for sorting and merging matches: (target id, query
    /// id, diagonal), then forward before inverted so ties are deterministic.
    #[inline]
    pub fn sort_key(&self) -> (u32, u32, i32, bool) {
        (self.target_id, self.query_id, self.diagonal, self.inverted)
    }

    /// Strand of the match
    #[inline]
    pub fn strand(&self) -> Strand {
        if self.inverted {
            Strand::Reverse
        } else {
            Strand::Forward
        }
    }

    /// Little-endian record layout of shard files
    #[inline]
    pub fn to_bytes(&self) -> [u8; Self::SERIALIZED_SIZE] {
        let mut bytes = [0u8; Self::SERIALIZED_SIZE];
        bytes[0..4].copy_from_slice(&self.target_id.to_le_bytes());
        bytes[4] = self.inverted as u8;
        bytes[5..9].copy_from_slice(&self.query_id.to_le_bytes());
        bytes[9..13].copy_from_slice(&self.diagonal.to_le_bytes());
        bytes
    }

    /// Decode a record written by [`SeedMatch::to_bytes`]
    #[inline]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let word = |off: usize| {
            let mut b = [0u8; 4];
            b.copy_from_slice(&bytes[off..off + 4]);
            b
        };
        Self {
            target_id: u32::from_le_bytes(word(0)),
            inverted: bytes[4] != 0,
            query_id: u32::from_le_bytes(word(5)),
            diagonal: i32::from_le_bytes(word(9)),
        }
    }
}

/// Sort matches into output order
pub fn sort_matches(matches: &mut [SeedMatch]) {
    matches.par_sort_unstable_by_key(SeedMatch::sort_key);
}

/// Fixed-capacity seed buffer for one shard.
///
/// The capacity budget includes one sentinel slot, so at most
/// `capacity - 1` seeds fit without growing.
#[derive(Debug)]
pub struct SeedBuffer {
    seeds: Vec<QuerySeed>,
    capacity: usize,
}

impl SeedBuffer {
    /// Allocate a buffer for `capacity` slots
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            seeds: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Slot budget, sentinel included
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Seeds that fit without growing
    pub fn max_seeds(&self) -> usize {
        self.capacity - 1
    }

    /// Number of seeds currently held
    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    /// True if no seeds are held
    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    /// Seeds in buffer order
    pub fn as_slice(&self) -> &[QuerySeed] {
        &self.seeds
    }

    /// Raise the slot budget to hold `seeds` seeds
    pub(crate) fn grow_to(&mut self, seeds: usize) {
        self.capacity = seeds + 1;
        self.seeds.reserve_exact(self.capacity.saturating_sub(self.seeds.len()));
    }

    /// Resize to exactly `len` placeholder seeds and hand out the storage
    /// for filling
    pub(crate) fn reset_len(&mut self, len: usize) -> &mut [QuerySeed] {
        debug_assert!(len < self.capacity);
        self.seeds.clear();
        self.seeds.resize(len, QuerySeed::EMPTY);
        &mut self.seeds
    }

    /// Parallel sort ascending by (key, id, position)
    pub fn sort(&mut self, seq_type: SeqType) {
        self.seeds.par_sort_unstable_by_key(|s| s.sort_key(seq_type));
    }

    /// Whether the seeds are in join order
    pub fn is_sorted(&self, seq_type: SeqType) -> bool {
        self.seeds
            .windows(2)
            .all(|w| w[0].sort_key(seq_type) <= w[1].sort_key(seq_type))
    }

    /// Heap bytes held by the buffer
    pub fn size_bytes(&self) -> usize {
        self.seeds.capacity() * std::mem::size_of::<QuerySeed>()
    }
}
