//! In-memory k-mer index

use tracing::info;

use super::{collect_index_entries, IndexEntry, IndexMetadata, KmerIndex};
use crate::encoding::Alphabet;
use crate::error::{Result, SearchError};
use crate::search::config::validate_kmer_size;
use crate::sequences::SequenceSource;

/// Index entries held in a `Vec`, streamed through a cursor
#[derive(Debug, Clone)]
pub struct MemoryKmerIndex {
    metadata: IndexMetadata,
    entries: Vec<IndexEntry>,
    cursor: usize,
}

impl MemoryKmerIndex {
    /// Index built from a target collection
    pub fn build<S: SequenceSource + ?Sized>(
        targets: &S,
        kmer_size: usize,
        spaced_kmer: bool,
        comp_bias_corr: bool,
        alphabet: &Alphabet,
    ) -> Result<Self> {
        if alphabet.seq_type() != targets.seq_type() {
            return Err(SearchError::InvalidConfig(format!(
                "{} alphabet used for {} targets",
                alphabet.seq_type(),
                targets.seq_type()
            )));
        }
        validate_kmer_size(kmer_size, alphabet.size())?;

        let metadata = IndexMetadata {
            kmer_size,
            alphabet_size: alphabet.size(),
            spaced_kmer,
            comp_bias_corr,
            max_seq_len: (0..targets.len())
                .map(|i| targets.sequence(i).len())
                .max()
                .unwrap_or(0),
            seq_type: targets.seq_type(),
        };
        let entries = collect_index_entries(targets, &metadata.pattern(), alphabet);
        info!(
            "Indexed {} k-mers from {} target sequences (k={}, alphabet={})",
            entries.len(),
            targets.len(),
            kmer_size,
            alphabet.size()
        );
        Ok(Self {
            metadata,
            entries,
            cursor: 0,
        })
    }

    /// Index over caller-provided entries; they are sorted into stream order
    pub fn from_entries(metadata: IndexMetadata, mut entries: Vec<IndexEntry>) -> Self {
        entries.sort_unstable_by_key(|e| (e.kmer.value, e.target_id, e.pos));
        Self {
            metadata,
            entries,
            cursor: 0,
        }
    }

    /// All entries in stream order
    pub fn as_slice(&self) -> &[IndexEntry] {
        &self.entries
    }
}

impl KmerIndex for MemoryKmerIndex {
    fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    fn num_entries(&self) -> u64 {
        self.entries.len() as u64
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }

    fn next_entry(&mut self) -> Option<IndexEntry> {
        let entry = self.entries.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(entry)
    }
}
