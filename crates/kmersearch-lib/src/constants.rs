//! Constants shared across the search pipeline
//!
//! Bit layout of packed k-mer keys, sizing heuristics for shard planning,
//! and the valid parameter ranges for k-mer extraction.

/// Bit used to carry the strand flag in a packed k-mer key (1 = forward)
pub const STRAND_BIT: u32 = 63;

/// Mask selecting the k-mer value bits of a packed key
pub const KMER_VALUE_MASK: u64 = !(1u64 << STRAND_BIT);

/// Safety factor applied to the per-shard seed capacity estimate
pub const SHARD_CAPACITY_MARGIN: f64 = 1.2;

/// Fraction of physical memory used when no explicit limit is configured
pub const DEFAULT_MEMORY_FRACTION: f64 = 0.9;

/// Seed for the k-mer ranking hash used by top-N selection
pub const DEFAULT_SEED: u64 = 1;

/// Alphabet size of nucleotide sequences (A, C, G, T)
pub const NUCLEOTIDE_ALPHABET_SIZE: usize = 4;

/// Alphabet size of the full amino acid alphabet (20 residues + X)
pub const AMINO_ACID_ALPHABET_SIZE: usize = 21;

/// Minimum k-mer length
pub const MIN_K: usize = 3;

/// Maximum nucleotide k-mer length (2 bits per base, strand bit reserved)
pub const MAX_NUCLEOTIDE_K: usize = 31;

/// Threshold for switching the k-way merge from linear scan to a loser tree
pub const MERGE_SCAN_THRESHOLD: usize = 16;

/// Bytes per GiB
pub const GIB: u64 = 1024 * 1024 * 1024;

/// Version number
pub const VERSION: (u8, u8, u8) = (0, 1, 0);

/// Maximum k-mer length for a given alphabet size so that the value fits in
/// 63 bits.
#[inline]
pub fn max_kmer_size(alphabet_size: usize) -> usize {
    if alphabet_size <= 1 {
        return 0;
    }
    let bits_per_residue = 64 - (alphabet_size as u64 - 1).leading_zeros() as usize;
    (STRAND_BIT as usize) / bits_per_residue
}
