//! Query sequence collections
//!
//! The search reads queries through [`SequenceSource`], so any storage that
//! can hand out `(key, bytes)` by index can be plugged in. [`SequenceDb`] is
//! the in-memory implementation: residues concatenated in one buffer with an
//! offsets table.

use crate::kmer::SeqType;

/// Read-only access to a keyed sequence collection
pub trait SequenceSource: Sync {
    /// Number of sequences
    fn len(&self) -> usize;

    /// True if the collection holds no sequences
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Declared sequence type
    fn seq_type(&self) -> SeqType;

    /// Identifier of the sequence at `index`
    fn key(&self, index: usize) -> u32;

    /// Residues of the sequence at `index`
    fn sequence(&self, index: usize) -> &[u8];

    /// Drop backing storage once every sequence has been consumed. Accessors
    /// must not be called afterwards.
    fn release(&mut self) {}
}

/// In-memory sequence collection
#[derive(Debug, Clone)]
pub struct SequenceDb {
    seq_type: SeqType,
    keys: Vec<u32>,
    /// `offsets[i]..offsets[i + 1]` delimits sequence `i` in `data`
    offsets: Vec<usize>,
    data: Vec<u8>,
}

impl SequenceDb {
    /// Empty collection of the given type
    pub fn new(seq_type: SeqType) -> Self {
        Self {
            seq_type,
            keys: Vec::new(),
            offsets: vec![0],
            data: Vec::new(),
        }
    }

    /// Collection from `(key, residues)` pairs
    pub fn from_sequences<'a, I>(seq_type: SeqType, sequences: I) -> Self
    where
        I: IntoIterator<Item = (u32, &'a [u8])>,
    {
        let mut db = Self::new(seq_type);
        for (key, seq) in sequences {
            db.push(key, seq);
        }
        db
    }

    /// Append a sequence
    pub fn push(&mut self, key: u32, seq: &[u8]) {
        self.keys.push(key);
        self.data.extend_from_slice(seq);
        self.offsets.push(self.data.len());
    }

    /// Total number of residues
    pub fn total_residues(&self) -> usize {
        self.data.len()
    }

    /// Length of the longest sequence
    pub fn max_len(&self) -> usize {
        self.offsets
            .windows(2)
            .map(|w| w[1] - w[0])
            .max()
            .unwrap_or(0)
    }

    /// Whether [`SequenceSource::release`] has been called
    pub fn is_released(&self) -> bool {
        self.data.is_empty() && self.offsets.len() <= 1 && !self.keys.is_empty()
    }
}

impl SequenceSource for SequenceDb {
    fn len(&self) -> usize {
        self.keys.len()
    }

    fn seq_type(&self) -> SeqType {
        self.seq_type
    }

    fn key(&self, index: usize) -> u32 {
        self.keys[index]
    }

    fn sequence(&self, index: usize) -> &[u8] {
        &self.data[self.offsets[index]..self.offsets[index + 1]]
    }

    fn release(&mut self) {
        self.data = Vec::new();
        self.offsets = vec![0];
    }
}
