// kmersearch: memory-bounded k-mer prefilter search
//
// Finds, for every target sequence, the query sequences sharing at least one
// k-mer with it, with an estimated diagonal and strand, while keeping seed
// buffers under a memory budget.

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod constants;
pub mod encoding;
pub mod error;
pub mod hasher;
pub mod index;
pub mod kmer;
pub mod result_writer;
pub mod search;
pub mod sequences;

// Re-export common types at crate root
pub use encoding::Alphabet;
pub use error::{Result, SearchError};
pub use index::{IndexEntry, IndexMetadata, KmerIndex, KmerIndexFile, KmerIndexWriter, MemoryKmerIndex};
pub use kmer::{KmerPattern, SeqType, Strand, StrandedKmer};
pub use result_writer::ResultDbWriter;
pub use search::{CapacityPolicy, Hit, HitSink, KmerSearch, MemorySink, SearchConfig, SearchStats};
pub use sequences::{SequenceDb, SequenceSource};

/// Version information
pub fn version() -> (u8, u8, u8) {
    constants::VERSION
}
