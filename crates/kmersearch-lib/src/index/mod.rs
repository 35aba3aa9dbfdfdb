//! Target k-mer index: metadata and the sorted entry stream
//!
//! The search only needs a forward-only stream of target k-mer entries in
//! ascending k-mer order, restartable once per shard, plus the parameters
//! the index was built with. [`KmerIndex`] captures exactly that contract.
//!
//! Two implementations ship with the crate:
//! - [`MemoryKmerIndex`]: entries held in a `Vec`
//! - [`KmerIndexFile`]: a memory-mapped `.kmi` file written by
//!   [`KmerIndexWriter`]

pub mod file;
pub mod memory;

pub use file::{KmerIndexFile, KmerIndexWriter};
pub use memory::MemoryKmerIndex;

use rayon::prelude::*;

use crate::encoding::Alphabet;
use crate::error::Result;
use crate::kmer::{KmerPattern, SeqType, StrandedKmer};
use crate::sequences::SequenceSource;

/// Parameters recorded in an index at build time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMetadata {
    /// Number of selected positions per k-mer
    pub kmer_size: usize,
    /// Residue alphabet size
    pub alphabet_size: usize,
    /// Spaced k-mer pattern in use
    pub spaced_kmer: bool,
    /// Composition bias correction flag
    pub comp_bias_corr: bool,
    /// Longest indexed target sequence
    pub max_seq_len: usize,
    /// Type of the indexed sequences
    pub seq_type: SeqType,
}

impl IndexMetadata {
    /// K-mer pattern the index was built with
    pub fn pattern(&self) -> KmerPattern {
        KmerPattern::for_params(self.kmer_size, self.spaced_kmer)
    }
}

/// One target k-mer occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Canonical k-mer and the strand it was read from
    pub kmer: StrandedKmer,
    /// Target sequence identifier
    pub target_id: u32,
    /// Forward-strand window start
    pub pos: i32,
    /// Target sequence length
    pub seq_len: u32,
}

/// Restartable, forward-only stream of index entries in ascending k-mer
/// order (strand ignored).
pub trait KmerIndex {
    /// Build parameters
    fn metadata(&self) -> &IndexMetadata;

    /// Total number of entries
    fn num_entries(&self) -> u64;

    /// Refresh the backing storage before a new pass. The default does
    /// nothing.
    fn remap(&mut self) -> Result<()> {
        Ok(())
    }

    /// Rewind the stream to its first entry
    fn reset(&mut self);

    /// Next entry, `None` once the stream is exhausted
    fn next_entry(&mut self) -> Option<IndexEntry>;

    /// Borrow the stream as an [`Iterator`] from its current position
    fn entries(&mut self) -> IndexEntries<'_, Self>
    where
        Self: Sized,
    {
        IndexEntries { index: self }
    }
}

/// Iterator adapter over a [`KmerIndex`]
pub struct IndexEntries<'a, I: KmerIndex> {
    index: &'a mut I,
}

impl<I: KmerIndex> Iterator for IndexEntries<'_, I> {
    type Item = IndexEntry;

    fn next(&mut self) -> Option<IndexEntry> {
        self.index.next_entry()
    }
}

/// Extract every k-mer of every target and sort by (k-mer value, target id,
/// position). This is the entry order every [`KmerIndex`] must stream.
pub fn collect_index_entries<S: SequenceSource + ?Sized>(
    targets: &S,
    pattern: &KmerPattern,
    alphabet: &Alphabet,
) -> Vec<IndexEntry> {
    let mut entries: Vec<IndexEntry> = (0..targets.len())
        .into_par_iter()
        .flat_map_iter(|i| {
            let seq = targets.sequence(i);
            let target_id = targets.key(i);
            let seq_len = seq.len() as u32;
            pattern
                .kmers(seq, alphabet)
                .map(move |(pos, kmer)| IndexEntry {
                    kmer,
                    target_id,
                    pos: pos as i32,
                    seq_len,
                })
                .collect::<Vec<_>>()
        })
        .collect();
    entries.par_sort_unstable_by_key(|e| (e.kmer.value, e.target_id, e.pos));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequences::SequenceDb;

    #[test]
    fn test_collect_entries_sorted() {
        let db = SequenceDb::from_sequences(
            SeqType::Nucleotide,
            [(5u32, b"ACGTAC".as_slice()), (2, b"TTTT".as_slice())],
        );
        let entries = collect_index_entries(&db, &KmerPattern::contiguous(3), &Alphabet::nucleotide());
        assert_eq!(entries.len(), 4 + 2);
        assert!(entries
            .windows(2)
            .all(|w| (w[0].kmer.value, w[0].target_id, w[0].pos)
                <= (w[1].kmer.value, w[1].target_id, w[1].pos)));
        // TTT is stored as the reverse complement of AAA, the smallest value
        assert_eq!(entries[0].kmer, StrandedKmer::reverse(0));
        assert_eq!(entries[0].target_id, 2);
        assert_eq!(entries[0].seq_len, 4);
    }
}
