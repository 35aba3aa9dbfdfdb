//! On-disk k-mer index (`.kmi`)
//!
//! # File Format
//!
//! All integers are little-endian.
//!
//! ```text
//! Header (40 bytes)
//!   ├─ magic: "KMSIDX01"
//!   ├─ version_major: u32
//!   ├─ version_minor: u32
//!   ├─ kmer_size: u32
//!   ├─ alphabet_size: u32
//!   ├─ spaced_kmer: u8
//!   ├─ comp_bias_corr: u8
//!   ├─ seq_type: u8 (0 = amino acid, 1 = nucleotide)
//!   ├─ reserved: u8
//!   ├─ max_seq_len: u32
//!   └─ num_entries: u64
//! Entries ([num_entries] × 20 bytes, ascending k-mer value)
//!   ├─ packed k-mer: u64 (bit 63 = forward strand for nucleotides)
//!   ├─ target_id: u32
//!   ├─ pos: i32
//!   └─ seq_len: u32
//! ```
//!
//! The entry section is memory-mapped and streamed without copying.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::{debug, info};

use super::{IndexEntry, IndexMetadata, KmerIndex};
use crate::error::{Result, SearchError};
use crate::kmer::{SeqType, StrandedKmer};

/// Magic bytes for the index format
const MAGIC: &[u8; 8] = b"KMSIDX01";

/// File format version: (major, minor)
const FORMAT_VERSION: (u32, u32) = (1, 0);

/// Header size in bytes
pub const HEADER_SIZE: usize = 40;

/// Entry size in bytes
pub const ENTRY_SIZE: usize = 20;

/// Parsed file header
#[derive(Debug, Clone, PartialEq, Eq)]
struct IndexHeader {
    metadata: IndexMetadata,
    num_entries: u64,
}

impl IndexHeader {
    fn write(&self, writer: &mut dyn Write) -> io::Result<()> {
        let m = &self.metadata;
        writer.write_all(MAGIC)?;
        writer.write_all(&FORMAT_VERSION.0.to_le_bytes())?;
        writer.write_all(&FORMAT_VERSION.1.to_le_bytes())?;
        writer.write_all(&(m.kmer_size as u32).to_le_bytes())?;
        writer.write_all(&(m.alphabet_size as u32).to_le_bytes())?;
        writer.write_all(&[
            m.spaced_kmer as u8,
            m.comp_bias_corr as u8,
            m.seq_type.as_u8(),
            0,
        ])?;
        writer.write_all(&(m.max_seq_len as u32).to_le_bytes())?;
        writer.write_all(&self.num_entries.to_le_bytes())?;
        Ok(())
    }

    fn read(reader: &mut dyn Read) -> Result<Self> {
        let mut buf = [0u8; HEADER_SIZE];
        reader
            .read_exact(&mut buf)
            .map_err(|_| SearchError::InvalidIndex("file shorter than header".into()))?;
        if &buf[0..8] != MAGIC {
            return Err(SearchError::InvalidIndex("bad magic number".into()));
        }
        let u32_at = |off: usize| u32::from_le_bytes(buf[off..off + 4].try_into().unwrap_or([0; 4]));
        let version_major = u32_at(8);
        if version_major != FORMAT_VERSION.0 {
            return Err(SearchError::InvalidIndex(format!(
                "unsupported format version {version_major} (expected {})",
                FORMAT_VERSION.0
            )));
        }
        let seq_type = SeqType::from_u8(buf[26])
            .ok_or_else(|| SearchError::InvalidIndex(format!("unknown sequence type tag {}", buf[26])))?;
        let metadata = IndexMetadata {
            kmer_size: u32_at(16) as usize,
            alphabet_size: u32_at(20) as usize,
            spaced_kmer: buf[24] != 0,
            comp_bias_corr: buf[25] != 0,
            max_seq_len: u32_at(28) as usize,
            seq_type,
        };
        let num_entries = u64::from_le_bytes(buf[32..40].try_into().unwrap_or([0; 8]));
        Ok(Self {
            metadata,
            num_entries,
        })
    }
}

fn encode_entry(entry: &IndexEntry, seq_type: SeqType) -> [u8; ENTRY_SIZE] {
    let mut buf = [0u8; ENTRY_SIZE];
    buf[0..8].copy_from_slice(&entry.kmer.to_packed(seq_type).to_le_bytes());
    buf[8..12].copy_from_slice(&entry.target_id.to_le_bytes());
    buf[12..16].copy_from_slice(&entry.pos.to_le_bytes());
    buf[16..20].copy_from_slice(&entry.seq_len.to_le_bytes());
    buf
}

fn decode_entry(bytes: &[u8], seq_type: SeqType) -> IndexEntry {
    let mut packed = [0u8; 8];
    packed.copy_from_slice(&bytes[0..8]);
    let field = |off: usize| {
        let mut b = [0u8; 4];
        b.copy_from_slice(&bytes[off..off + 4]);
        b
    };
    IndexEntry {
        kmer: StrandedKmer::from_packed(u64::from_le_bytes(packed), seq_type),
        target_id: u32::from_le_bytes(field(8)),
        pos: i32::from_le_bytes(field(12)),
        seq_len: u32::from_le_bytes(field(16)),
    }
}

/// Writes a `.kmi` file from entries already in stream order
pub struct KmerIndexWriter {
    path: PathBuf,
}

impl KmerIndexWriter {
    /// Writer targeting `path`
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Write header and entries. Entries must be sorted by k-mer value.
    pub fn write(&self, metadata: &IndexMetadata, entries: &[IndexEntry]) -> Result<()> {
        debug_assert!(entries.windows(2).all(|w| w[0].kmer.value <= w[1].kmer.value));
        let file = File::create(&self.path)?;
        let mut writer = BufWriter::with_capacity(4 * 1024 * 1024, file);
        IndexHeader {
            metadata: metadata.clone(),
            num_entries: entries.len() as u64,
        }
        .write(&mut writer)?;
        for entry in entries {
            writer.write_all(&encode_entry(entry, metadata.seq_type))?;
        }
        writer.flush()?;
        info!("Wrote {} index entries to {}", entries.len(), self.path.display());
        Ok(())
    }
}

/// Memory-mapped `.kmi` index
pub struct KmerIndexFile {
    path: PathBuf,
    metadata: IndexMetadata,
    num_entries: u64,
    mmap: Mmap,
    cursor: u64,
}

impl KmerIndexFile {
    /// Open and validate an index file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(SearchError::MissingIndex(path));
        }
        let mut file = File::open(&path)?;
        let header = IndexHeader::read(&mut file)?;
        let mmap = Self::map_checked(&file, header.num_entries)?;
        debug!(
            "Opened index {} ({} entries, k={}, {})",
            path.display(),
            header.num_entries,
            header.metadata.kmer_size,
            header.metadata.seq_type
        );
        Ok(Self {
            path,
            metadata: header.metadata,
            num_entries: header.num_entries,
            mmap,
            cursor: 0,
        })
    }

    fn map_checked(file: &File, num_entries: u64) -> Result<Mmap> {
        // SAFETY: the index is opened read-only and never modified while mapped
        let mmap = unsafe { Mmap::map(file)? };
        let expected = num_entries
            .checked_mul(ENTRY_SIZE as u64)
            .and_then(|bytes| bytes.checked_add(HEADER_SIZE as u64))
            .ok_or_else(|| {
                SearchError::InvalidIndex(format!("entry count {num_entries} overflows file size"))
            })?;
        if mmap.len() as u64 != expected {
            return Err(SearchError::InvalidIndex(format!(
                "file size {} does not match {} entries (expected {} bytes)",
                mmap.len(),
                num_entries,
                expected
            )));
        }
        Ok(mmap)
    }

    /// Path of the mapped file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KmerIndex for KmerIndexFile {
    fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Drop the current mapping and map the file again, releasing pages
    /// touched by the previous pass.
    fn remap(&mut self) -> Result<()> {
        let file = File::open(&self.path)?;
        self.mmap = Self::map_checked(&file, self.num_entries)?;
        self.cursor = 0;
        Ok(())
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }

    fn next_entry(&mut self) -> Option<IndexEntry> {
        if self.cursor >= self.num_entries {
            return None;
        }
        let start = HEADER_SIZE + self.cursor as usize * ENTRY_SIZE;
        self.cursor += 1;
        Some(decode_entry(
            &self.mmap[start..start + ENTRY_SIZE],
            self.metadata.seq_type,
        ))
    }
}
