//! Error type for the search engine

use std::path::PathBuf;

use thiserror::Error;

use crate::kmer::SeqType;

/// Errors surfaced by the search pipeline.
///
/// Every variant except `Io` is detected before any shard work starts.
#[derive(Debug, Error)]
pub enum SearchError {
    /// A requested parameter conflicts with the one recorded in the index
    #[error(
        "index was created with {parameter} {index_value} but the search was called with \
         {parameter} {requested}; rebuild the index with `{remedy}`"
    )]
    ParameterMismatch {
        /// Command line name of the parameter (e.g. `-k`)
        parameter: &'static str,
        /// Value recorded in the index metadata
        index_value: String,
        /// Value requested by the caller
        requested: String,
        /// Command that rebuilds a compatible index
        remedy: String,
    },

    /// Query and target sequence types differ
    #[error("sequence type of query ({query}) and target index ({target}) do not match")]
    SeqTypeMismatch {
        /// Query collection type
        query: SeqType,
        /// Target index type
        target: SeqType,
    },

    /// The index file does not exist
    #[error("no k-mer index found at {0}; create it first with `kmersearch createindex`")]
    MissingIndex(PathBuf),

    /// The index file exists but cannot be interpreted
    #[error("invalid k-mer index: {0}; recreate it with `kmersearch createindex`")]
    InvalidIndex(String),

    /// Configuration values out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The seed buffer estimate was too small and growing is disabled
    #[error("seed buffer capacity exceeded: {needed} seeds extracted, capacity {capacity}")]
    CapacityExceeded {
        /// Slots required (seeds plus sentinel slot)
        needed: usize,
        /// Slots available
        capacity: usize,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, SearchError>;
