//! K-mer values, strands and extraction patterns
//!
//! A k-mer value is the base-`alphabet_size` number formed by the residue
//! codes at the pattern's selected offsets. Nucleotide k-mers are stored in
//! canonical form (the smaller of forward and reverse complement) together
//! with the strand they were read from.
//!
//! The strand travels as an explicit field. Only at serialization boundaries
//! is it folded into bit 63 of a packed 64-bit key (1 = forward).

use std::fmt;

use crate::constants::{KMER_VALUE_MASK, STRAND_BIT};
use crate::encoding::{complement_code, Alphabet};

/// Declared type of a sequence collection or index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeqType {
    /// DNA/RNA sequences; k-mers are canonicalized and carry a strand
    Nucleotide,
    /// Protein sequences
    AminoAcid,
}

impl SeqType {
    /// Tag used in on-disk headers
    pub fn as_u8(self) -> u8 {
        match self {
            SeqType::AminoAcid => 0,
            SeqType::Nucleotide => 1,
        }
    }

    /// Parse an on-disk tag
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(SeqType::AminoAcid),
            1 => Some(SeqType::Nucleotide),
            _ => None,
        }
    }

    /// Whether k-mers of this type are strand-aware
    #[inline]
    pub fn is_nucleotide(self) -> bool {
        matches!(self, SeqType::Nucleotide)
    }
}

impl fmt::Display for SeqType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeqType::Nucleotide => write!(f, "nucleotide"),
            SeqType::AminoAcid => write!(f, "amino acid"),
        }
    }
}

impl std::str::FromStr for SeqType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nucl" | "nucleotide" | "dna" => Ok(SeqType::Nucleotide),
            "aa" | "amino" | "protein" => Ok(SeqType::AminoAcid),
            _ => Err(format!("unknown sequence type '{s}'; expected 'nucl' or 'aa'")),
        }
    }
}

/// Orientation a k-mer was read in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Strand {
    /// Reverse complement was the canonical form
    Reverse,
    /// Forward k-mer was the canonical form
    Forward,
}

impl Strand {
    /// True for [`Strand::Reverse`]
    #[inline]
    pub fn is_reverse(self) -> bool {
        matches!(self, Strand::Reverse)
    }
}

/// A k-mer value with its strand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrandedKmer {
    /// K-mer value (at most 63 bits)
    pub value: u64,
    /// Strand the canonical value was read from
    pub strand: Strand,
}

impl StrandedKmer {
    /// Forward k-mer
    #[inline]
    pub fn forward(value: u64) -> Self {
        Self {
            value,
            strand: Strand::Forward,
        }
    }

    /// Reverse-complement k-mer
    #[inline]
    pub fn reverse(value: u64) -> Self {
        Self {
            value,
            strand: Strand::Reverse,
        }
    }

    /// Packed 64-bit key. Nucleotide keys set bit 63 for the forward strand;
    /// amino acid keys are the plain value.
    #[inline]
    pub fn to_packed(self, seq_type: SeqType) -> u64 {
        match (seq_type, self.strand) {
            (SeqType::Nucleotide, Strand::Forward) => self.value | (1u64 << STRAND_BIT),
            _ => self.value & KMER_VALUE_MASK,
        }
    }

    /// Inverse of [`StrandedKmer::to_packed`]
    #[inline]
    pub fn from_packed(packed: u64, seq_type: SeqType) -> Self {
        let value = packed & KMER_VALUE_MASK;
        match seq_type {
            SeqType::Nucleotide if packed >> STRAND_BIT == 0 => Self::reverse(value),
            _ => Self::forward(value),
        }
    }

    /// Key used when comparing seeds against each other or against the
    /// index. Nucleotide keys are compared with the strand bit forced to 1,
    /// so both strands of one canonical k-mer compare equal.
    #[inline]
    pub fn comparison_key(self, seq_type: SeqType) -> u64 {
        match seq_type {
            SeqType::Nucleotide => self.value | (1u64 << STRAND_BIT),
            SeqType::AminoAcid => self.to_packed(seq_type),
        }
    }
}

/// Offsets of a (possibly spaced) k-mer inside its window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KmerPattern {
    offsets: Vec<usize>,
    span: usize,
}

impl KmerPattern {
    /// Contiguous pattern of length `k`
    pub fn contiguous(k: usize) -> Self {
        Self {
            offsets: (0..k).collect(),
            span: k,
        }
    }

    /// Spaced pattern with `k` selected positions: two used, one skipped,
    /// repeating (`11011011...`), always ending on a selected position.
    pub fn spaced(k: usize) -> Self {
        let offsets: Vec<usize> = (0..).filter(|i| i % 3 != 2).take(k).collect();
        let span = offsets.last().map_or(0, |&last| last + 1);
        Self { offsets, span }
    }

    /// Pattern selected by index parameters
    pub fn for_params(k: usize, spaced: bool) -> Self {
        if spaced {
            Self::spaced(k)
        } else {
            Self::contiguous(k)
        }
    }

    /// Number of selected positions
    #[inline]
    pub fn k(&self) -> usize {
        self.offsets.len()
    }

    /// Window length covered by the pattern
    #[inline]
    pub fn span(&self) -> usize {
        self.span
    }

    /// Whether any position is skipped
    #[inline]
    pub fn is_spaced(&self) -> bool {
        self.span != self.offsets.len()
    }

    /// Number of windows in a sequence of length `len`
    #[inline]
    pub fn num_windows(&self, len: usize) -> usize {
        if self.span == 0 {
            0
        } else {
            (len + 1).saturating_sub(self.span)
        }
    }

    /// Encode one window of exactly `span` residues.
    ///
    /// Returns `None` when a selected position holds a residue outside the
    /// alphabet. Nucleotide windows are canonicalized; ties keep the forward
    /// strand.
    pub fn encode_window(&self, window: &[u8], alphabet: &Alphabet) -> Option<StrandedKmer> {
        debug_assert_eq!(window.len(), self.span);
        let base = alphabet.size() as u64;
        let mut fwd = 0u64;
        for &off in &self.offsets {
            let code = alphabet.encode(window[off])?;
            fwd = fwd * base + code as u64;
        }
        if !alphabet.seq_type().is_nucleotide() {
            return Some(StrandedKmer::forward(fwd));
        }

        // Reverse complement read through the same pattern
        let mut rev = 0u64;
        for &off in &self.offsets {
            let code = alphabet.encode(window[self.span - 1 - off])?;
            rev = rev * base + complement_code(code) as u64;
        }
        if fwd <= rev {
            Some(StrandedKmer::forward(fwd))
        } else {
            Some(StrandedKmer::reverse(rev))
        }
    }

    /// All valid k-mers of a sequence as `(window start, k-mer)` pairs
    pub fn kmers<'a>(
        &'a self,
        seq: &'a [u8],
        alphabet: &'a Alphabet,
    ) -> impl Iterator<Item = (usize, StrandedKmer)> + 'a {
        let seq: &'a [u8] = if self.span == 0 { &[] } else { seq };
        seq.windows(self.span.max(1))
            .enumerate()
            .filter_map(move |(pos, w)| self.encode_window(w, alphabet).map(|km| (pos, km)))
    }
}
