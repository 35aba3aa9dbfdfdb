//! Search configuration and index parameter reconciliation

use std::path::PathBuf;

use crate::constants::{max_kmer_size, DEFAULT_SEED, MIN_K};
use crate::error::{Result, SearchError};
use crate::index::IndexMetadata;
use crate::kmer::{KmerPattern, SeqType};

/// What to do when a shard extracts more seeds than its buffer was sized for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CapacityPolicy {
    /// Reallocate to the exact size and log a warning
    #[default]
    Grow,
    /// Abort with [`SearchError::CapacityExceeded`]
    Fail,
}

/// Configuration for one search run
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Requested k-mer length; `None` accepts the index value
    pub kmer_size: Option<usize>,

    /// Requested alphabet size; `None` accepts the index value
    pub alphabet_size: Option<usize>,

    /// Requested spaced k-mer mode; `None` accepts the index value
    pub spaced_kmer: Option<bool>,

    /// Requested composition bias correction; `None` accepts the index value
    pub comp_bias_corr: Option<bool>,

    /// Seeds kept per query sequence (0 = all)
    pub kmers_per_sequence: usize,

    /// Memory budget for seed and match buffers; `None` uses 90% of
    /// physical memory
    pub memory_limit_bytes: Option<u64>,

    /// Gzip-compress result records
    pub compressed: bool,

    /// Number of threads for parallel operations (0 = all available cores)
    pub num_threads: usize,

    /// Directory for shard temp files
    pub tmp_dirname: PathBuf,

    /// Behavior on seed buffer overrun
    pub capacity_policy: CapacityPolicy,

    /// Force a shard count instead of estimating one
    pub shards: Option<usize>,

    /// Seed for the k-mer ranking hash
    pub seed: u64,

    /// Verbose output
    pub verbose: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            kmer_size: None,
            alphabet_size: None,
            spaced_kmer: None,
            comp_bias_corr: None,
            kmers_per_sequence: 0,
            memory_limit_bytes: None,
            compressed: false,
            num_threads: 0,
            tmp_dirname: std::env::temp_dir(),
            capacity_policy: CapacityPolicy::Grow,
            shards: None,
            seed: DEFAULT_SEED,
            verbose: true,
        }
    }
}

impl SearchConfig {
    /// Validate the configuration parameters
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(alphabet_size) = self.alphabet_size {
            if alphabet_size < 2 {
                return Err(format!("alphabet size must be at least 2, got {alphabet_size}"));
            }
        }
        if let Some(k) = self.kmer_size {
            if k < MIN_K {
                return Err(format!("k must be at least {MIN_K}, got k={k}"));
            }
            if let Some(alphabet_size) = self.alphabet_size {
                let max_k = max_kmer_size(alphabet_size);
                if k > max_k {
                    return Err(format!(
                        "k={k} does not fit in 63 bits with alphabet size {alphabet_size} (max {max_k})"
                    ));
                }
            }
        }
        if self.memory_limit_bytes == Some(0) {
            return Err("memory limit must be positive".to_string());
        }
        if self.shards == Some(0) {
            return Err("shard count must be positive".to_string());
        }
        Ok(())
    }

    /// Log configuration parameters via tracing
    pub fn print(&self) {
        let requested = |v: Option<String>| v.unwrap_or_else(|| "from index".to_string());
        tracing::info!("Search Configuration:");
        tracing::info!("  k = {}", requested(self.kmer_size.map(|k| k.to_string())));
        tracing::info!(
            "  alphabet_size = {}",
            requested(self.alphabet_size.map(|a| a.to_string()))
        );
        tracing::debug!(
            "  spaced_kmer = {}",
            requested(self.spaced_kmer.map(|s| s.to_string()))
        );
        tracing::debug!(
            "  comp_bias_corr = {}",
            requested(self.comp_bias_corr.map(|c| c.to_string()))
        );
        if self.kmers_per_sequence == 0 {
            tracing::info!("  kmers_per_sequence = all");
        } else {
            tracing::info!("  kmers_per_sequence = {}", self.kmers_per_sequence);
        }
        match self.memory_limit_bytes {
            Some(bytes) => tracing::info!("  memory_limit = {} bytes", bytes),
            None => tracing::info!("  memory_limit = 90% of system memory"),
        }
        if let Some(shards) = self.shards {
            tracing::info!("  shards = {} (forced)", shards);
        }
        if self.num_threads == 0 {
            tracing::info!("  num_threads = all available cores");
        } else {
            tracing::info!("  num_threads = {}", self.num_threads);
        }
        tracing::debug!("  compressed = {}", self.compressed);
        tracing::debug!("  capacity_policy = {:?}", self.capacity_policy);
        tracing::debug!("  seed = {}", self.seed);
        tracing::debug!("  tmp_dirname = {:?}", self.tmp_dirname);
    }
}

/// Effective parameters of a run, taken from the index metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    /// Sequence type shared by queries and targets
    pub seq_type: SeqType,
    /// K-mer length
    pub kmer_size: usize,
    /// Alphabet size
    pub alphabet_size: usize,
    /// Spaced k-mer mode
    pub spaced_kmer: bool,
    /// Composition bias correction flag
    pub comp_bias_corr: bool,
    /// Seeds kept per query sequence (0 = all)
    pub kmers_per_sequence: usize,
    /// Window pattern derived from k and the spaced mode
    pub pattern: KmerPattern,
}

/// Check that `kmer_size` is usable with `alphabet_size`
pub fn validate_kmer_size(kmer_size: usize, alphabet_size: usize) -> Result<()> {
    let max_k = max_kmer_size(alphabet_size);
    if kmer_size < MIN_K || kmer_size > max_k {
        return Err(SearchError::InvalidConfig(format!(
            "k must be in range [{MIN_K}, {max_k}] for alphabet size {alphabet_size}, got k={kmer_size}"
        )));
    }
    Ok(())
}

fn check<T: PartialEq + ToString>(
    parameter: &'static str,
    index_value: T,
    requested: Option<T>,
    remedy_value: impl Fn(&T) -> String,
) -> Result<()> {
    match requested {
        Some(requested) if requested != index_value => Err(SearchError::ParameterMismatch {
            parameter,
            index_value: index_value.to_string(),
            remedy: format!("kmersearch createindex {parameter} {}", remedy_value(&requested)),
            requested: requested.to_string(),
        }),
        _ => Ok(()),
    }
}

impl IndexMetadata {
    /// Resolve the effective search parameters against the values recorded
    /// in this index. Every explicitly requested parameter must agree with
    /// the index, and the query type must match the target type.
    pub fn reconcile(&self, config: &SearchConfig, query_type: SeqType) -> Result<SearchParams> {
        check("-k", self.kmer_size, config.kmer_size, |k| k.to_string())?;
        check("--alph-size", self.alphabet_size, config.alphabet_size, |a| {
            a.to_string()
        })?;
        let flag = |b: &bool| (*b as u8).to_string();
        check("--spaced-kmer-mode", self.spaced_kmer, config.spaced_kmer, flag)?;
        check("--comp-bias-corr", self.comp_bias_corr, config.comp_bias_corr, flag)?;
        if query_type != self.seq_type {
            return Err(SearchError::SeqTypeMismatch {
                query: query_type,
                target: self.seq_type,
            });
        }
        validate_kmer_size(self.kmer_size, self.alphabet_size)?;

        Ok(SearchParams {
            seq_type: self.seq_type,
            kmer_size: self.kmer_size,
            alphabet_size: self.alphabet_size,
            spaced_kmer: self.spaced_kmer,
            comp_bias_corr: self.comp_bias_corr,
            kmers_per_sequence: config.kmers_per_sequence,
            pattern: self.pattern(),
        })
    }
}
