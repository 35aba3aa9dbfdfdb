//! Search orchestration
//!
//! Runs the pipeline under a memory budget:
//! 1. Reconcile requested parameters with the index metadata
//! 2. Estimate seed count and memory, pick a shard count
//! 3. Per shard: remap index, extract, sort, join, sort matches
//! 4. One shard: group straight into the sink. Several: spill each shard,
//!    then k-way merge the spill files and group once.

use std::time::Instant;

use sysinfo::System;
use tracing::{debug, info};

use super::config::{SearchConfig, SearchParams};
use super::external_merge::ShardSpill;
use super::extract::{estimate_total_seeds, SeedExtractor, ShardAssignment};
use super::group::{group_matches, GroupStats, HitSink};
use super::join::merge_join;
use super::seeds::{sort_matches, QuerySeed, SeedBuffer, SeedMatch};
use crate::constants::{DEFAULT_MEMORY_FRACTION, SHARD_CAPACITY_MARGIN};
use crate::encoding::Alphabet;
use crate::error::{Result, SearchError};
use crate::hasher::KmerRanker;
use crate::index::KmerIndex;
use crate::sequences::SequenceSource;

/// Bytes needed to hold `total_seeds` seeds and as many matches
pub fn estimate_memory_bytes(total_seeds: usize) -> u64 {
    total_seeds as u64 * (std::mem::size_of::<QuerySeed>() + std::mem::size_of::<SeedMatch>()) as u64
}

/// Shards needed to keep `need_bytes` under `limit_bytes`. Anything above
/// one shard gets one extra for headroom.
pub fn shard_count(need_bytes: u64, limit_bytes: u64) -> usize {
    let limit = limit_bytes.max(1);
    let shards = need_bytes.div_ceil(limit).max(1) as usize;
    if shards > 1 {
        shards + 1
    } else {
        shards
    }
}

/// Seed slots for one shard's buffer, sentinel included
pub fn shard_capacity(total_seeds: usize, shards: usize) -> usize {
    let seeds = if shards > 1 {
        (total_seeds as f64 / shards as f64 * SHARD_CAPACITY_MARGIN) as usize
    } else {
        total_seeds
    };
    seeds + 1
}

/// Summary of one search run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Shards the run was split into
    pub shards: usize,
    /// Upper bound on seeds used for planning
    pub estimated_seeds: usize,
    /// Seeds actually extracted over all shards
    pub seeds: usize,
    /// Joined seed matches over all shards
    pub matches: usize,
    /// Targets written to the sink
    pub targets: usize,
    /// Hits written to the sink
    pub hits: usize,
}

/// Memory-bounded k-mer search
pub struct KmerSearch {
    config: SearchConfig,
    alphabet: Option<Alphabet>,
}

impl KmerSearch {
    /// Create a search with a validated configuration
    pub fn new(config: SearchConfig) -> Result<Self> {
        config.validate().map_err(SearchError::InvalidConfig)?;
        Ok(Self {
            config,
            alphabet: None,
        })
    }

    /// Use a caller-supplied alphabet, e.g. a reduced amino acid alphabet.
    /// Its size must match the index.
    pub fn with_alphabet(mut self, alphabet: Alphabet) -> Self {
        self.alphabet = Some(alphabet);
        self
    }

    /// Configuration in use
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Memory budget in bytes: the configured limit, or 90% of physical
    /// memory
    pub fn memory_limit_bytes(&self) -> u64 {
        match self.config.memory_limit_bytes {
            Some(bytes) => bytes,
            None => {
                let mut sys = System::new();
                sys.refresh_memory();
                (sys.total_memory() as f64 * DEFAULT_MEMORY_FRACTION) as u64
            }
        }
    }

    /// Search `queries` against `index`, writing one hit list per target to
    /// `sink`.
    ///
    /// All parallel work runs in a rayon pool sized by
    /// `config.num_threads` (0 = all cores).
    pub fn run<S, I, K>(&self, queries: &mut S, index: &mut I, sink: &mut K) -> Result<SearchStats>
    where
        S: SequenceSource + Send + ?Sized,
        I: KmerIndex + Send + ?Sized,
        K: HitSink + Send + ?Sized,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.num_threads)
            .build()
            .map_err(|e| SearchError::InvalidConfig(format!("failed to create thread pool: {e}")))?;

        pool.install(|| self.run_inner(queries, index, sink))
    }

    fn resolve_alphabet(&self, params: &SearchParams) -> Result<Alphabet> {
        let alphabet = match &self.alphabet {
            Some(alphabet) => alphabet.clone(),
            None => Alphabet::for_params(params.seq_type, params.alphabet_size)
                .map_err(|e| SearchError::InvalidConfig(e.to_string()))?,
        };
        if alphabet.seq_type() != params.seq_type || alphabet.size() != params.alphabet_size {
            return Err(SearchError::InvalidConfig(format!(
                "alphabet ({}, size {}) does not match index ({}, size {})",
                alphabet.seq_type(),
                alphabet.size(),
                params.seq_type,
                params.alphabet_size
            )));
        }
        Ok(alphabet)
    }

    fn run_inner<S, I, K>(&self, queries: &mut S, index: &mut I, sink: &mut K) -> Result<SearchStats>
    where
        S: SequenceSource + ?Sized,
        I: KmerIndex + ?Sized,
        K: HitSink + ?Sized,
    {
        let start = Instant::now();
        if self.config.verbose {
            self.config.print();
        }

        let params = index.metadata().reconcile(&self.config, queries.seq_type())?;
        let alphabet = self.resolve_alphabet(&params)?;
        info!(
            "Searching {} {} queries against {} index entries (k={}, alphabet={}, spaced={})",
            queries.len(),
            params.seq_type,
            index.num_entries(),
            params.kmer_size,
            params.alphabet_size,
            params.spaced_kmer
        );

        let estimated_seeds =
            estimate_total_seeds(&*queries, &params.pattern, params.kmers_per_sequence);
        let need = estimate_memory_bytes(estimated_seeds);
        let shards = match self.config.shards {
            Some(forced) => forced,
            None => shard_count(need, self.memory_limit_bytes()),
        };
        info!(
            "Estimated {} seeds ({:.2} MB), running {} shard(s)",
            estimated_seeds,
            need as f64 / (1024.0 * 1024.0),
            shards
        );

        let extractor = SeedExtractor::new(
            &params.pattern,
            &alphabet,
            KmerRanker::new(self.config.seed),
            params.kmers_per_sequence,
        );
        let mut stats = SearchStats {
            shards,
            estimated_seeds,
            ..SearchStats::default()
        };

        let group = if shards == 1 {
            let matches = self.search_shard(
                &extractor,
                queries,
                index,
                &params,
                ShardAssignment::single(),
                shard_capacity(estimated_seeds, 1),
                &mut stats,
            )?;
            group_matches(matches, sink, params.seq_type)?
        } else {
            let spill = ShardSpill::new(&self.config.tmp_dirname)?;
            for shard in 0..shards {
                let matches = self.search_shard(
                    &extractor,
                    queries,
                    index,
                    &params,
                    ShardAssignment { shard, shards },
                    shard_capacity(estimated_seeds, shards),
                    &mut stats,
                )?;
                spill.write_shard(&matches)?;
            }
            let merge_start = Instant::now();
            let group = group_matches(spill.merge()?, sink, params.seq_type)?;
            spill.remove_files();
            debug!("Merged shard files in {:.2?}", merge_start.elapsed());
            group
        };
        sink.finish()?;

        let GroupStats { targets, hits } = group;
        stats.targets = targets;
        stats.hits = hits;
        info!(
            "Search complete in {:.2?}: {} seeds, {} matches, {} hits for {} targets",
            start.elapsed(),
            stats.seeds,
            stats.matches,
            stats.hits,
            stats.targets
        );
        Ok(stats)
    }

    /// Extract, sort and join one shard. Returns its matches in output order.
    #[allow(clippy::too_many_arguments)]
    fn search_shard<S, I>(
        &self,
        extractor: &SeedExtractor<'_>,
        queries: &mut S,
        index: &mut I,
        params: &SearchParams,
        shard: ShardAssignment,
        capacity: usize,
        stats: &mut SearchStats,
    ) -> Result<Vec<SeedMatch>>
    where
        S: SequenceSource + ?Sized,
        I: KmerIndex + ?Sized,
    {
        let shard_start = Instant::now();
        index.remap()?;

        let mut seeds = SeedBuffer::with_capacity(capacity);
        let num_seeds = extractor.extract(&*queries, shard, &mut seeds, self.config.capacity_policy)?;
        if shard.shards == 1 {
            queries.release();
        }
        seeds.sort(params.seq_type);
        debug_assert!(seeds.is_sorted(params.seq_type));
        let seed_bytes = seeds.size_bytes();

        let mut matches = merge_join(seeds.as_slice(), index, params.seq_type);
        drop(seeds);
        sort_matches(&mut matches);

        stats.seeds += num_seeds;
        stats.matches += matches.len();
        info!(
            "Shard {}/{}: {} seeds ({:.2} MB buffer), {} matches in {:.2?}",
            shard.shard + 1,
            shard.shards,
            num_seeds,
            seed_bytes as f64 / (1024.0 * 1024.0),
            matches.len(),
            shard_start.elapsed()
        );
        Ok(matches)
    }
}
