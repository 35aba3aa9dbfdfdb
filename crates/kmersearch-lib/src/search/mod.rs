//! Seed search pipeline
//!
//! ```text
//! queries ─► extract ─► sort ─► merge-join ◄─ index stream
//!                                   │
//!                             sort matches
//!                                   │
//!             one shard ────────────┼──────────── several shards
//!                 │                                     │
//!               group                           spill to temp file
//!                 │                                     │
//!                 ▼                             k-way merge ─► group
//!               sink ◄──────────────────────────────────┘
//! ```
//!
//! [`KmerSearch`] drives the stages; each stage is usable on its own.

pub mod config;
pub mod coordinator;
pub mod external_merge;
pub mod extract;
pub mod group;
pub mod join;
pub mod seeds;

pub use config::{CapacityPolicy, SearchConfig, SearchParams};
pub use coordinator::{estimate_memory_bytes, shard_count, KmerSearch, SearchStats};
pub use extract::{estimate_total_seeds, SeedExtractor, ShardAssignment};
pub use group::{group_matches, Hit, HitSink, MemorySink, ResultGrouper};
pub use join::{merge_join, resolve_strand};
pub use seeds::{sort_matches, QuerySeed, SeedBuffer, SeedMatch};
