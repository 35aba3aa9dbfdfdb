//! Merge-join of sorted query seeds against the index stream
//!
//! Both sides are ascending by k-mer key. On a key match one [`SeedMatch`]
//! is emitted and only the query cursor moves, so every query seed with
//! that key pairs with the index entry the stream currently sits on. The
//! join ends when either side runs out.

use std::cmp::Ordering;

use super::seeds::{QuerySeed, SeedMatch};
use crate::index::{IndexEntry, KmerIndex};
use crate::kmer::SeqType;

/// Orientation and diagonal of one seed hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrandResolution {
    /// Seed and entry lie on opposite strands
    pub inverted: bool,
    /// Target position minus query position
    pub diagonal: i32,
}

/// Reconcile the strands of a nucleotide query seed and index entry.
///
/// When exactly one side was read as a reverse complement, the hit is
/// inverted. When the query seed is the reverse-complement side, both
/// positions are mirrored onto the reverse strand first.
///
/// | entry reverse | seed reverse | entry coord | seed coord | inverted |
/// |---|---|---|---|---|
/// | yes | no  | pos | pos | yes |
/// | yes | yes | mirrored | mirrored | no |
/// | no  | yes | mirrored | mirrored | yes |
/// | no  | no  | pos | pos | no |
#[inline]
pub fn resolve_strand(seed: &QuerySeed, entry: &IndexEntry) -> StrandResolution {
    let entry_reverse = entry.kmer.strand.is_reverse();
    let seed_reverse = seed.kmer.strand.is_reverse();
    let (entry_pos, seed_pos) = if seed_reverse {
        (
            (entry.seq_len as i32 - 1) - entry.pos,
            (seed.seq_len as i32 - 1) - seed.pos,
        )
    } else {
        (entry.pos, seed.pos)
    };
    StrandResolution {
        inverted: entry_reverse != seed_reverse,
        diagonal: entry_pos - seed_pos,
    }
}

#[inline]
fn make_match(seed: &QuerySeed, entry: &IndexEntry, seq_type: SeqType) -> SeedMatch {
    match seq_type {
        SeqType::Nucleotide => {
            let resolved = resolve_strand(seed, entry);
            SeedMatch {
                target_id: entry.target_id,
                inverted: resolved.inverted,
                query_id: seed.id,
                diagonal: resolved.diagonal,
            }
        }
        SeqType::AminoAcid => SeedMatch {
            target_id: entry.target_id,
            inverted: false,
            query_id: seed.id,
            diagonal: entry.pos - seed.pos,
        },
    }
}

/// Join `seeds` (sorted by [`QuerySeed::sort_key`]) against `index`.
///
/// The index is rewound before the pass. Matches come out in seed order;
/// callers sort them with [`super::seeds::sort_matches`].
pub fn merge_join<I: KmerIndex + ?Sized>(
    seeds: &[QuerySeed],
    index: &mut I,
    seq_type: SeqType,
) -> Vec<SeedMatch> {
    index.reset();
    let mut matches = Vec::new();
    if seeds.is_empty() {
        return matches;
    }
    let Some(mut entry) = index.next_entry() else {
        return matches;
    };

    let mut qi = 0;
    loop {
        let seed = &seeds[qi];
        let query_key = seed.kmer.comparison_key(seq_type);
        let target_key = entry.kmer.comparison_key(seq_type);
        match query_key.cmp(&target_key) {
            Ordering::Less => {
                qi += 1;
                if qi == seeds.len() {
                    break;
                }
            }
            Ordering::Greater => match index.next_entry() {
                Some(next) => entry = next,
                None => break,
            },
            Ordering::Equal => {
                matches.push(make_match(seed, &entry, seq_type));
                qi += 1;
                if qi == seeds.len() {
                    break;
                }
            }
        }
    }
    matches
}
