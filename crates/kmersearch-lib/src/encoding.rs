//! Residue alphabets
//!
//! Maps sequence bytes to dense residue codes used to build k-mer values.
//!
//! Nucleotide encoding:
//! - A (65/97)        -> 0
//! - C (67/99)        -> 1
//! - G (71/103)       -> 2
//! - T/U (84/85, ...) -> 3
//!
//! With this layout the complement of a code is `3 - code`.
//!
//! Amino acid encoding uses the 20 standard residues in alphabetical
//! one-letter order followed by `X`; every other letter maps to `X`.
//! Reduced amino acid alphabets are built elsewhere and handed over as a
//! lookup table through [`Alphabet::from_lookup`].

use thiserror::Error;

use crate::constants::{AMINO_ACID_ALPHABET_SIZE, NUCLEOTIDE_ALPHABET_SIZE};
use crate::kmer::SeqType;

/// Marker for bytes outside the alphabet
pub const INVALID_CODE: u8 = 0xFF;

/// Standard amino acid residues, in code order
pub const AMINO_ACIDS: &[u8; 20] = b"ACDEFGHIKLMNPQRSTVWY";

/// Error type for alphabet construction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// Nucleotide data only supports the four-letter alphabet
    #[error("nucleotide alphabet must have size 4, got {0}")]
    NucleotideSize(usize),
    /// A reduced amino acid alphabet was requested without a lookup table
    #[error("amino acid alphabet of size {0} needs an externally supplied reduction table")]
    ReductionRequired(usize),
    /// A lookup table maps a byte outside `0..size`
    #[error("lookup table maps byte {byte:?} to code {code}, outside alphabet of size {size}")]
    CodeOutOfRange {
        /// Input byte
        byte: u8,
        /// Code assigned to it
        code: u8,
        /// Declared alphabet size
        size: usize,
    },
}

/// Encode a single nucleotide to its 2-bit code
#[inline]
pub const fn encode_base(base: u8) -> Option<u8> {
    match base {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' | b'U' | b'u' => Some(3),
        _ => None,
    }
}

/// Complement of an encoded nucleotide
#[inline]
pub const fn complement_code(code: u8) -> u8 {
    3 - code
}

/// Byte-to-code table for one sequence type
#[derive(Clone)]
pub struct Alphabet {
    lut: [u8; 256],
    size: usize,
    seq_type: SeqType,
}

impl std::fmt::Debug for Alphabet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Alphabet")
            .field("size", &self.size)
            .field("seq_type", &self.seq_type)
            .finish()
    }
}

impl Alphabet {
    /// Four-letter nucleotide alphabet
    pub fn nucleotide() -> Self {
        let mut lut = [INVALID_CODE; 256];
        for b in 0..=255u8 {
            if let Some(code) = encode_base(b) {
                lut[b as usize] = code;
            }
        }
        Self {
            lut,
            size: NUCLEOTIDE_ALPHABET_SIZE,
            seq_type: SeqType::Nucleotide,
        }
    }

    /// Full amino acid alphabet (20 residues + X)
    pub fn amino_acid() -> Self {
        let x_code = (AMINO_ACID_ALPHABET_SIZE - 1) as u8;
        let mut lut = [INVALID_CODE; 256];
        for b in b'A'..=b'Z' {
            lut[b as usize] = x_code;
            lut[b.to_ascii_lowercase() as usize] = x_code;
        }
        lut[b'*' as usize] = x_code;
        for (code, &aa) in AMINO_ACIDS.iter().enumerate() {
            lut[aa as usize] = code as u8;
            lut[aa.to_ascii_lowercase() as usize] = code as u8;
        }
        Self {
            lut,
            size: AMINO_ACID_ALPHABET_SIZE,
            seq_type: SeqType::AminoAcid,
        }
    }

    /// Alphabet from an external lookup table (e.g. a reduced amino acid
    /// alphabet). Bytes mapped to [`INVALID_CODE`] are treated as ambiguous.
    pub fn from_lookup(
        seq_type: SeqType,
        lut: [u8; 256],
        size: usize,
    ) -> Result<Self, EncodingError> {
        if seq_type == SeqType::Nucleotide && size != NUCLEOTIDE_ALPHABET_SIZE {
            return Err(EncodingError::NucleotideSize(size));
        }
        for (byte, &code) in lut.iter().enumerate() {
            if code != INVALID_CODE && code as usize >= size {
                return Err(EncodingError::CodeOutOfRange {
                    byte: byte as u8,
                    code,
                    size,
                });
            }
        }
        Ok(Self { lut, size, seq_type })
    }

    /// Default alphabet for a sequence type and size
    pub fn for_params(seq_type: SeqType, size: usize) -> Result<Self, EncodingError> {
        match seq_type {
            SeqType::Nucleotide if size == NUCLEOTIDE_ALPHABET_SIZE => Ok(Self::nucleotide()),
            SeqType::Nucleotide => Err(EncodingError::NucleotideSize(size)),
            SeqType::AminoAcid if size == AMINO_ACID_ALPHABET_SIZE => Ok(Self::amino_acid()),
            SeqType::AminoAcid => Err(EncodingError::ReductionRequired(size)),
        }
    }

    /// Code of a byte, `None` if outside the alphabet
    #[inline]
    pub fn encode(&self, byte: u8) -> Option<u8> {
        let code = self.lut[byte as usize];
        if code == INVALID_CODE {
            None
        } else {
            Some(code)
        }
    }

    /// Number of distinct codes
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Sequence type this alphabet encodes
    #[inline]
    pub fn seq_type(&self) -> SeqType {
        self.seq_type
    }
}
