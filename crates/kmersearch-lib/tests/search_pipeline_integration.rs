//! Integration tests for the search pipeline
//!
//! These tests run complete searches from sequences to grouped hits, through
//! both index implementations and both the unsharded and sharded paths.

use kmersearch_lib::index::{IndexEntry, IndexMetadata};
use kmersearch_lib::result_writer::read_result_db;
use kmersearch_lib::search::estimate_memory_bytes;
use kmersearch_lib::{
    Alphabet, CapacityPolicy, Hit, KmerIndex, KmerIndexFile, KmerIndexWriter, KmerSearch,
    MemoryKmerIndex, MemorySink, ResultDbWriter, SearchConfig, SearchError, SearchStats, SeqType,
    SequenceDb, SequenceSource, StrandedKmer,
};
use std::path::Path;
use tempfile::TempDir;

struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

fn random_dna(rng: &mut Lcg, len: usize) -> Vec<u8> {
    (0..len).map(|_| b"ACGT"[(rng.next() % 4) as usize]).collect()
}

fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .rev()
        .map(|&b| match b {
            b'A' => b'T',
            b'C' => b'G',
            b'G' => b'C',
            _ => b'A',
        })
        .collect()
}

/// Targets plus queries derived from them: substrings, some reverse
/// complemented, with point mutations, and a few unrelated sequences.
fn dataset() -> (SequenceDb, SequenceDb) {
    let mut rng = Lcg(42);
    let targets: Vec<(u32, Vec<u8>)> = (0..25u32)
        .map(|i| {
            let len = 80 + (rng.next() % 120) as usize;
            (100 + i, random_dna(&mut rng, len))
        })
        .collect();

    let mut queries: Vec<(u32, Vec<u8>)> = Vec::new();
    for i in 0..40u32 {
        let (_, base) = &targets[(i % 25) as usize];
        let start = (rng.next() % 20) as usize;
        let end = base.len() - (rng.next() % 20) as usize;
        let mut seq = base[start..end].to_vec();
        for _ in 0..seq.len() / 20 {
            let p = (rng.next() as usize) % seq.len();
            seq[p] = b"ACGT"[(rng.next() % 4) as usize];
        }
        if i % 3 == 0 {
            seq = reverse_complement(&seq);
        }
        if i % 7 == 0 {
            seq.insert(seq.len() / 2, b'N');
        }
        queries.push((i, seq));
    }
    for i in 40..45u32 {
        queries.push((i, random_dna(&mut rng, 60)));
    }

    let to_db = |seqs: &[(u32, Vec<u8>)]| {
        SequenceDb::from_sequences(
            SeqType::Nucleotide,
            seqs.iter().map(|(id, s)| (*id, s.as_slice())),
        )
    };
    (to_db(&queries), to_db(&targets))
}

fn config(tmp: &Path) -> SearchConfig {
    SearchConfig {
        memory_limit_bytes: Some(1 << 30),
        num_threads: 2,
        tmp_dirname: tmp.to_path_buf(),
        verbose: false,
        ..SearchConfig::default()
    }
}

fn run<I: KmerIndex + Send>(
    queries: &SequenceDb,
    index: &mut I,
    config: SearchConfig,
) -> (SearchStats, Vec<(u32, Vec<Hit>)>) {
    let mut queries = queries.clone();
    let mut sink = MemorySink::new();
    let stats = KmerSearch::new(config)
        .unwrap()
        .run(&mut queries, index, &mut sink)
        .unwrap();
    assert!(sink.finished);
    (stats, sink.targets)
}

fn nucleotide_metadata(kmer_size: usize) -> IndexMetadata {
    IndexMetadata {
        kmer_size,
        alphabet_size: 4,
        spaced_kmer: false,
        comp_bias_corr: false,
        max_seq_len: 8,
        seq_type: SeqType::Nucleotide,
    }
}

#[test]
fn test_single_kmer_scenario() {
    let tmp = TempDir::new().unwrap();
    let queries = SequenceDb::from_sequences(SeqType::Nucleotide, [(1u32, b"ACGTACGT".as_slice())]);
    let acgt = 0b00_01_10_11;
    let mut index = MemoryKmerIndex::from_entries(
        nucleotide_metadata(4),
        vec![IndexEntry {
            kmer: StrandedKmer::forward(acgt),
            target_id: 5,
            pos: 0,
            seq_len: 8,
        }],
    );

    let (stats, targets) = run(&queries, &mut index, config(tmp.path()));
    assert_eq!(targets, vec![(5, vec![Hit { query_id: 1, score: 0, diagonal: 0 }])]);
    assert_eq!(stats.shards, 1);
    assert_eq!(stats.targets, 1);
    assert_eq!(stats.hits, 1);
}

#[test]
fn test_self_hit_has_zero_score() {
    let tmp = TempDir::new().unwrap();
    let db = SequenceDb::from_sequences(
        SeqType::Nucleotide,
        [(7u32, b"GATTACAGGCTTAACCGTAGGATCCA".as_slice())],
    );
    let mut index = MemoryKmerIndex::build(&db, 5, false, false, &Alphabet::nucleotide()).unwrap();

    for shards in [None, Some(3)] {
        let (_, targets) = run(&db, &mut index, SearchConfig { shards, ..config(tmp.path()) });
        assert_eq!(targets.len(), 1);
        let (target, hits) = &targets[0];
        assert_eq!(*target, 7);
        assert_eq!(hits, &vec![Hit { query_id: 7, score: 0, diagonal: 0 }]);
    }
}

#[test]
fn test_sharded_output_matches_unsharded() {
    let tmp = TempDir::new().unwrap();
    let (queries, targets) = dataset();
    let mut index = MemoryKmerIndex::build(&targets, 7, true, false, &Alphabet::nucleotide()).unwrap();

    for kmers_per_sequence in [0, 12] {
        let base = SearchConfig { kmers_per_sequence, ..config(tmp.path()) };
        let (stats, expected) = run(&queries, &mut index, base.clone());
        assert_eq!(stats.shards, 1);
        assert!(expected.len() >= 20);
        // Reverse-complemented queries produce inverted hits
        assert!(expected.iter().flat_map(|(_, h)| h).any(|h| h.score == 1));

        for shards in [2, 3, 5] {
            let (stats, actual) = run(
                &queries,
                &mut index,
                SearchConfig { shards: Some(shards), ..base.clone() },
            );
            assert_eq!(stats.shards, shards);
            assert_eq!(actual, expected, "shards={shards} kmers_per_sequence={kmers_per_sequence}");
        }
    }
    // Spill files are gone
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
}

#[test]
fn test_memory_limit_drives_shard_count() {
    let tmp = TempDir::new().unwrap();
    let (queries, targets) = dataset();
    let mut index = MemoryKmerIndex::build(&targets, 9, false, false, &Alphabet::nucleotide()).unwrap();

    let (stats, expected) = run(&queries, &mut index, config(tmp.path()));
    let need = estimate_memory_bytes(stats.estimated_seeds);

    // Limit of half the estimate: ceil(2) shards plus one
    let limited = SearchConfig {
        memory_limit_bytes: Some(need.div_ceil(2)),
        ..config(tmp.path())
    };
    let (stats, actual) = run(&queries, &mut index, limited);
    assert_eq!(stats.shards, 3);
    assert_eq!(actual, expected);
}

#[test]
fn test_capacity_policy() {
    let tmp = TempDir::new().unwrap();
    let (queries, targets) = dataset();
    let queries = SequenceDb::from_sequences(
        SeqType::Nucleotide,
        (0..3).map(|i| (queries.key(i), queries.sequence(i))),
    );
    let mut index = MemoryKmerIndex::build(&targets, 7, false, false, &Alphabet::nucleotide()).unwrap();
    let (_, expected) = run(&queries, &mut index, config(tmp.path()));

    // A few hundred seeds over 200 shards: each buffer is sized for one or two
    let shards = 200;
    let strict = SearchConfig {
        shards: Some(shards),
        capacity_policy: CapacityPolicy::Fail,
        ..config(tmp.path())
    };
    let mut q = queries.clone();
    let mut sink = MemorySink::new();
    let err = KmerSearch::new(strict)
        .unwrap()
        .run(&mut q, &mut index, &mut sink)
        .unwrap_err();
    assert!(matches!(err, SearchError::CapacityExceeded { .. }));

    let growing = SearchConfig {
        shards: Some(shards),
        capacity_policy: CapacityPolicy::Grow,
        ..config(tmp.path())
    };
    let (_, actual) = run(&queries, &mut index, growing);
    assert_eq!(actual, expected);
}

#[test]
fn test_index_file_search_matches_memory_index() {
    let tmp = TempDir::new().unwrap();
    let (queries, targets) = dataset();
    let mut memory = MemoryKmerIndex::build(&targets, 8, true, true, &Alphabet::nucleotide()).unwrap();
    let path = tmp.path().join("targets.kmi");
    KmerIndexWriter::new(&path)
        .write(memory.metadata(), memory.as_slice())
        .unwrap();
    let mut file = KmerIndexFile::open(&path).unwrap();
    assert_eq!(file.metadata(), memory.metadata());
    assert_eq!(file.num_entries(), memory.num_entries());

    let spill_dir = tmp.path().join("spill");
    let (_, expected) = run(&queries, &mut memory, config(&spill_dir));
    for shards in [None, Some(4)] {
        let (_, actual) = run(&queries, &mut file, SearchConfig { shards, ..config(&spill_dir) });
        assert_eq!(actual, expected);
    }
}

#[test]
fn test_result_db_output() {
    let tmp = TempDir::new().unwrap();
    let (queries, targets) = dataset();
    let mut index = MemoryKmerIndex::build(&targets, 7, true, false, &Alphabet::nucleotide()).unwrap();
    let (_, expected) = run(&queries, &mut index, config(tmp.path()));

    for compressed in [false, true] {
        let out = tmp.path().join(format!("result_{compressed}"));
        let mut writer = ResultDbWriter::create(&out, compressed).unwrap();
        let mut q = queries.clone();
        let stats = KmerSearch::new(SearchConfig { compressed, shards: Some(2), ..config(tmp.path()) })
            .unwrap()
            .run(&mut q, &mut index, &mut writer)
            .unwrap();
        assert_eq!(writer.num_records(), stats.targets);
        assert_eq!(read_result_db(&out, compressed).unwrap(), expected);
    }
}

#[test]
fn test_queries_released_only_when_unsharded() {
    let tmp = TempDir::new().unwrap();
    let (queries, targets) = dataset();
    let mut index = MemoryKmerIndex::build(&targets, 7, false, false, &Alphabet::nucleotide()).unwrap();
    let search = |shards| KmerSearch::new(SearchConfig { shards, ..config(tmp.path()) }).unwrap();

    let mut q = queries.clone();
    search(None).run(&mut q, &mut index, &mut MemorySink::new()).unwrap();
    assert!(q.is_released());

    let mut q = queries.clone();
    search(Some(2)).run(&mut q, &mut index, &mut MemorySink::new()).unwrap();
    assert!(!q.is_released());
}

#[test]
fn test_parameter_mismatch_detected_before_search() {
    let tmp = TempDir::new().unwrap();
    let (queries, targets) = dataset();
    let mut index = MemoryKmerIndex::build(&targets, 7, true, false, &Alphabet::nucleotide()).unwrap();

    let mut q = queries.clone();
    let mut sink = MemorySink::new();
    let err = KmerSearch::new(SearchConfig { kmer_size: Some(9), ..config(tmp.path()) })
        .unwrap()
        .run(&mut q, &mut index, &mut sink)
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("-k 7"), "{msg}");
    assert!(msg.contains("-k 9"), "{msg}");
    assert!(msg.contains("kmersearch createindex -k 9"), "{msg}");
    assert!(sink.targets.is_empty());
    assert!(!sink.finished);
    assert!(!q.is_released());

    let proteins = SequenceDb::from_sequences(SeqType::AminoAcid, [(1u32, b"MKVLAT".as_slice())]);
    let mut q = proteins.clone();
    let err = KmerSearch::new(config(tmp.path()))
        .unwrap()
        .run(&mut q, &mut index, &mut sink)
        .unwrap_err();
    assert!(matches!(
        err,
        SearchError::SeqTypeMismatch { query: SeqType::AminoAcid, target: SeqType::Nucleotide }
    ));
}

#[test]
fn test_amino_acid_search() {
    let tmp = TempDir::new().unwrap();
    let targets = SequenceDb::from_sequences(
        SeqType::AminoAcid,
        [
            (10u32, b"MKTAYIAKQRQISFVKSHFSRQ".as_slice()),
            (11, b"GSHMLEDPVDAFQGVWLNRW".as_slice()),
        ],
    );
    let queries = SequenceDb::from_sequences(
        SeqType::AminoAcid,
        [(1u32, b"AAAKQRQISFV".as_slice()), (2, b"WWWWWW".as_slice())],
    );
    let mut index = MemoryKmerIndex::build(&targets, 5, false, false, &Alphabet::amino_acid()).unwrap();

    let (_, hits) = run(&queries, &mut index, config(tmp.path()));
    // KQRQI starts at 7 in the target and 3 in the query
    assert_eq!(hits, vec![(10, vec![Hit { query_id: 1, score: 0, diagonal: 4 }])]);
}
