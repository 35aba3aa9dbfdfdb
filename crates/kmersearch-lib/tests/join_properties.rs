//! Property tests: the merge-join against a brute-force join

use std::collections::BTreeSet;

use kmersearch_lib::index::{IndexEntry, IndexMetadata};
use kmersearch_lib::search::{group_matches, merge_join, resolve_strand, sort_matches, QuerySeed, SeedMatch};
use kmersearch_lib::{MemoryKmerIndex, MemorySink, SeqType, Strand, StrandedKmer};
use proptest::prelude::*;

fn metadata(seq_type: SeqType) -> IndexMetadata {
    IndexMetadata {
        kmer_size: 5,
        alphabet_size: if seq_type.is_nucleotide() { 4 } else { 21 },
        spaced_kmer: false,
        comp_bias_corr: false,
        max_seq_len: 500,
        seq_type,
    }
}

fn strand(reverse: bool) -> Strand {
    if reverse {
        Strand::Reverse
    } else {
        Strand::Forward
    }
}

/// One entry per distinct key, with target fields derived from the key
fn index_entries(keys: &BTreeSet<u64>, reverse_mask: u64) -> Vec<IndexEntry> {
    keys.iter()
        .map(|&value| IndexEntry {
            kmer: StrandedKmer { value, strand: strand((value ^ reverse_mask) % 3 == 0) },
            target_id: (value % 13) as u32,
            pos: (value % 97) as i32,
            seq_len: 400,
        })
        .collect()
}

fn sorted_seeds(raw: Vec<(u64, u32, i32, bool)>, seq_type: SeqType) -> Vec<QuerySeed> {
    let mut seeds: Vec<QuerySeed> = raw
        .into_iter()
        .map(|(value, id, pos, reverse)| QuerySeed {
            kmer: StrandedKmer { value, strand: strand(reverse && seq_type.is_nucleotide()) },
            id,
            pos,
            seq_len: 300,
        })
        .collect();
    seeds.sort_unstable_by_key(|s| s.sort_key(seq_type));
    seeds
}

fn brute_force(seeds: &[QuerySeed], entries: &[IndexEntry], seq_type: SeqType) -> Vec<SeedMatch> {
    seeds
        .iter()
        .filter_map(|seed| {
            let entry = entries.iter().find(|e| e.kmer.value == seed.kmer.value)?;
            Some(match seq_type {
                SeqType::AminoAcid => SeedMatch {
                    target_id: entry.target_id,
                    inverted: false,
                    query_id: seed.id,
                    diagonal: entry.pos - seed.pos,
                },
                SeqType::Nucleotide => {
                    let resolved = resolve_strand(seed, entry);
                    SeedMatch {
                        target_id: entry.target_id,
                        inverted: resolved.inverted,
                        query_id: seed.id,
                        diagonal: resolved.diagonal,
                    }
                }
            })
        })
        .collect()
}

fn seed_strategy() -> impl Strategy<Value = Vec<(u64, u32, i32, bool)>> {
    prop::collection::vec((0u64..400, 0u32..20, 0i32..250, any::<bool>()), 0..150)
}

proptest! {
    #[test]
    fn prop_join_equals_brute_force_amino_acid(
        keys in prop::collection::btree_set(0u64..400, 0..80),
        raw in seed_strategy(),
    ) {
        let entries = index_entries(&keys, 0);
        let seeds = sorted_seeds(raw, SeqType::AminoAcid);
        let mut index = MemoryKmerIndex::from_entries(metadata(SeqType::AminoAcid), entries.clone());
        let joined = merge_join(&seeds, &mut index, SeqType::AminoAcid);
        prop_assert_eq!(joined, brute_force(&seeds, &entries, SeqType::AminoAcid));
    }

    #[test]
    fn prop_join_equals_brute_force_nucleotide(
        keys in prop::collection::btree_set(0u64..400, 0..80),
        reverse_mask in 0u64..8,
        raw in seed_strategy(),
    ) {
        let entries = index_entries(&keys, reverse_mask);
        let seeds = sorted_seeds(raw, SeqType::Nucleotide);
        let mut index = MemoryKmerIndex::from_entries(metadata(SeqType::Nucleotide), entries.clone());
        let mut joined = merge_join(&seeds, &mut index, SeqType::Nucleotide);
        let mut expected = brute_force(&seeds, &entries, SeqType::Nucleotide);
        sort_matches(&mut joined);
        sort_matches(&mut expected);
        prop_assert_eq!(joined, expected);
    }

    #[test]
    fn prop_grouping_keeps_first_hit_per_query(
        keys in prop::collection::btree_set(0u64..400, 1..80),
        raw in seed_strategy(),
    ) {
        let entries = index_entries(&keys, 1);
        let seeds = sorted_seeds(raw, SeqType::Nucleotide);
        let mut index = MemoryKmerIndex::from_entries(metadata(SeqType::Nucleotide), entries);
        let mut matches = merge_join(&seeds, &mut index, SeqType::Nucleotide);
        sort_matches(&mut matches);

        let mut sink = MemorySink::new();
        group_matches(matches.iter().copied(), &mut sink, SeqType::Nucleotide).unwrap();

        for (target, hits) in &sink.targets {
            let queries: BTreeSet<u32> = hits.iter().map(|h| h.query_id).collect();
            prop_assert_eq!(queries.len(), hits.len());
            for hit in hits {
                let lowest = matches
                    .iter()
                    .filter(|m| m.target_id == *target && m.query_id == hit.query_id)
                    .map(|m| m.diagonal)
                    .min();
                prop_assert_eq!(Some(hit.diagonal), lowest);
                if hit.query_id == *target {
                    prop_assert_eq!(hit.score, 0);
                }
            }
        }
    }
}
