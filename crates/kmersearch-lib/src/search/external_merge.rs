//! Shard spill files and their k-way merge
//!
//! When a search runs in more than one shard, every shard's sorted matches
//! are written to a temp file of packed 13-byte records. After the last
//! shard the files are memory-mapped and merged back into one stream in
//! (target id, query id, diagonal) order:
//!
//! - up to 16 files: linear scan for the minimum
//! - more files: tournament tree, O(log N) per record
//!
//! Temp files are removed when the [`ShardSpill`] is dropped.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use memmap2::Mmap;
use tracing::{debug, info};

use super::seeds::SeedMatch;
use crate::constants::MERGE_SCAN_THRESHOLD;

const RECORD_SIZE: usize = SeedMatch::SERIALIZED_SIZE;

static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Temp file set holding per-shard sorted matches
pub struct ShardSpill {
    tmp_dir: PathBuf,
    run_id: String,
    num_files: AtomicU64,
    num_records: AtomicU64,
}

impl ShardSpill {
    /// Create a spill area under `tmp_dir`, creating the directory if needed
    pub fn new(tmp_dir: impl AsRef<Path>) -> io::Result<Self> {
        let tmp_dir = tmp_dir.as_ref().to_path_buf();
        fs::create_dir_all(&tmp_dir)?;

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let run_id = format!(
            "{}_{}_{}",
            std::process::id(),
            nanos,
            RUN_COUNTER.fetch_add(1, Ordering::Relaxed)
        );

        Ok(Self {
            tmp_dir,
            run_id,
            num_files: AtomicU64::new(0),
            num_records: AtomicU64::new(0),
        })
    }

    fn file_path(&self, id: u64) -> PathBuf {
        self.tmp_dir
            .join(format!("kmersearch.tmp.run_{}.shard.{}.bin", self.run_id, id))
    }

    /// Write one shard's matches, already in output order. Returns the file id.
    pub fn write_shard(&self, matches: &[SeedMatch]) -> io::Result<u64> {
        debug_assert!(matches.windows(2).all(|w| w[0].sort_key() <= w[1].sort_key()));
        let file_id = self.num_files.fetch_add(1, Ordering::SeqCst);
        let path = self.file_path(file_id);
        debug!("Spilling {} matches to {:?}", matches.len(), path);

        let file = File::create(&path)?;
        let mut writer = BufWriter::with_capacity(1024 * 1024, file);
        for m in matches {
            writer.write_all(&m.to_bytes())?;
        }
        writer.flush()?;
        self.num_records
            .fetch_add(matches.len() as u64, Ordering::SeqCst);
        Ok(file_id)
    }

    /// Number of shard files written
    pub fn num_files(&self) -> u64 {
        self.num_files.load(Ordering::SeqCst)
    }

    /// Total records across all shard files
    pub fn num_records(&self) -> u64 {
        self.num_records.load(Ordering::SeqCst)
    }

    /// Open every shard file for a k-way merge
    pub fn merge(&self) -> io::Result<MatchMergingIterator> {
        let num_files = self.num_files();
        info!(
            "Merging {} shard files ({} matches)...",
            num_files,
            self.num_records()
        );
        let mut runs = Vec::with_capacity(num_files as usize);
        for id in 0..num_files {
            let path = self.file_path(id);
            let file = File::open(&path)?;
            if file.metadata()?.len() == 0 {
                continue;
            }
            // SAFETY: spill files are private to this run and not modified
            // after being written
            let mmap = unsafe { Mmap::map(&file)? };
            if mmap.len() % RECORD_SIZE != 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("truncated shard file {path:?}"),
                ));
            }
            runs.push(MatchRun { mmap, offset: 0 });
        }
        Ok(MatchMergingIterator::new(runs))
    }

    /// Delete all shard files
    pub fn remove_files(&self) {
        for id in 0..self.num_files() {
            let _ = fs::remove_file(self.file_path(id));
        }
    }
}

impl Drop for ShardSpill {
    fn drop(&mut self) {
        self.remove_files();
    }
}

/// Cursor over one mapped shard file
struct MatchRun {
    mmap: Mmap,
    offset: usize,
}

impl MatchRun {
    #[inline]
    fn current(&self) -> SeedMatch {
        SeedMatch::from_bytes(&self.mmap[self.offset..self.offset + RECORD_SIZE])
    }

    /// Step to the next record; false once the run is exhausted
    #[inline]
    fn advance(&mut self) -> bool {
        self.offset += RECORD_SIZE;
        self.offset < self.mmap.len()
    }
}

const NONE: u32 = u32::MAX;

/// K-way merge over shard files
pub struct MatchMergingIterator {
    runs: Vec<MatchRun>,
    /// Tournament tree, leaves at `tree_size..2 * tree_size`; empty in
    /// linear-scan mode
    tree: Vec<u32>,
    tree_size: usize,
    min_idx: usize,
    num_active: usize,
}

impl MatchMergingIterator {
    fn new(runs: Vec<MatchRun>) -> Self {
        let num_active = runs.len();
        let mut merger = Self {
            runs,
            tree: Vec::new(),
            tree_size: 0,
            min_idx: 0,
            num_active,
        };
        if num_active <= MERGE_SCAN_THRESHOLD {
            merger.compute_min_linear();
        } else {
            merger.build_tree();
        }
        merger
    }

    fn uses_tree(&self) -> bool {
        !self.tree.is_empty()
    }

    fn compute_min_linear(&mut self) {
        if self.runs.is_empty() {
            return;
        }
        self.min_idx = 0;
        let mut min_key = self.runs[0].current().sort_key();
        for (i, run) in self.runs.iter().enumerate().skip(1) {
            let key = run.current().sort_key();
            if key < min_key {
                min_key = key;
                self.min_idx = i;
            }
        }
    }

    #[inline]
    fn winner(&self, a: u32, b: u32) -> u32 {
        if a == NONE {
            b
        } else if b == NONE {
            a
        } else if self.runs[b as usize].current().sort_key()
            < self.runs[a as usize].current().sort_key()
        {
            b
        } else {
            a
        }
    }

    fn build_tree(&mut self) {
        let n = self.runs.len();
        self.tree_size = n.next_power_of_two();
        self.tree = vec![NONE; 2 * self.tree_size];
        for i in 0..n {
            self.tree[self.tree_size + i] = i as u32;
        }
        for p in (1..self.tree_size).rev() {
            self.tree[p] = self.winner(self.tree[2 * p], self.tree[2 * p + 1]);
        }
        self.min_idx = self.tree[1] as usize;
    }

    fn update_tree(&mut self, run: usize, alive: bool) {
        let mut p = self.tree_size + run;
        if !alive {
            self.tree[p] = NONE;
        }
        p /= 2;
        while p >= 1 {
            self.tree[p] = self.winner(self.tree[2 * p], self.tree[2 * p + 1]);
            p /= 2;
        }
        if self.tree[1] != NONE {
            self.min_idx = self.tree[1] as usize;
        }
    }
}

impl Iterator for MatchMergingIterator {
    type Item = SeedMatch;

    fn next(&mut self) -> Option<SeedMatch> {
        if self.num_active == 0 {
            return None;
        }
        let run = self.min_idx;
        let item = self.runs[run].current();
        let alive = self.runs[run].advance();
        if !alive {
            self.num_active -= 1;
        }

        if self.uses_tree() {
            self.update_tree(run, alive);
        } else {
            if !alive {
                self.runs.swap_remove(run);
            }
            self.compute_min_linear();
        }
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::seeds::sort_matches;
    use tempfile::TempDir;

    fn m(target_id: u32, query_id: u32, diagonal: i32) -> SeedMatch {
        SeedMatch { target_id, inverted: false, query_id, diagonal }
    }

    fn spill_and_merge(shards: Vec<Vec<SeedMatch>>) -> Vec<SeedMatch> {
        let tmp = TempDir::new().unwrap();
        let spill = ShardSpill::new(tmp.path()).unwrap();
        for mut shard in shards {
            sort_matches(&mut shard);
            spill.write_shard(&shard).unwrap();
        }
        spill.merge().unwrap().collect()
    }

    #[test]
    fn test_merge_two_shards() {
        let merged = spill_and_merge(vec![
            vec![m(1, 1, 0), m(3, 2, 4)],
            vec![m(2, 9, -1), m(1, 1, -5)],
        ]);
        assert_eq!(merged, vec![m(1, 1, -5), m(1, 1, 0), m(2, 9, -1), m(3, 2, 4)]);
    }

    #[test]
    fn test_merge_skips_empty_shards() {
        let merged = spill_and_merge(vec![Vec::new(), vec![m(4, 4, 0)], Vec::new()]);
        assert_eq!(merged, vec![m(4, 4, 0)]);
        assert!(spill_and_merge(vec![Vec::new()]).is_empty());
    }

    #[test]
    fn test_merge_many_shards_uses_tree() {
        // 40 shards exceeds the linear-scan threshold
        let shards: Vec<Vec<SeedMatch>> = (0..40u32)
            .map(|s| (0..25u32).map(|i| m((i * 7 + s) % 31, s, i as i32 - 12)).collect())
            .collect();
        let mut expected: Vec<SeedMatch> = shards.iter().flatten().copied().collect();
        sort_matches(&mut expected);
        assert_eq!(spill_and_merge(shards), expected);
    }

    #[test]
    fn test_files_removed_on_drop() {
        let tmp = TempDir::new().unwrap();
        {
            let spill = ShardSpill::new(tmp.path()).unwrap();
            spill.write_shard(&[m(1, 2, 3)]).unwrap();
            spill.write_shard(&[]).unwrap();
            assert_eq!(spill.num_files(), 2);
            assert_eq!(spill.num_records(), 1);
            assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 2);
        }
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }
}
