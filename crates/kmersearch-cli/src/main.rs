use clap::{Parser, Subcommand};
use kmersearch_lib::constants::GIB;
use kmersearch_lib::{
    Alphabet, CapacityPolicy, KmerIndex, KmerIndexFile, KmerIndexWriter, KmerSearch,
    MemoryKmerIndex, ResultDbWriter, SearchConfig, SeqType, SequenceDb, SequenceSource,
};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "kmersearch")]
#[command(version = "0.1.0")]
#[command(about = "Memory-bounded k-mer prefilter search", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a k-mer index from target sequences
    Createindex {
        /// Target FASTA/FASTQ file
        #[arg(short, long)]
        input: String,

        /// Output index file (.kmi)
        #[arg(short, long)]
        output: Option<String>,

        /// K-mer length
        #[arg(short, long)]
        k: usize,

        /// Alphabet size (default: 4 for nucleotides, 21 for amino acids)
        #[arg(long = "alph-size")]
        alph_size: Option<usize>,

        /// Use spaced k-mers (0 or 1)
        #[arg(long = "spaced-kmer-mode", default_value = "1")]
        spaced_kmer_mode: u8,

        /// Composition bias correction flag recorded in the index (0 or 1)
        #[arg(long = "comp-bias-corr", default_value = "1")]
        comp_bias_corr: u8,

        /// Sequence type: nucl or aa
        #[arg(long = "seq-type", default_value = "nucl")]
        seq_type: SeqType,

        /// Number of threads (0 = all available cores)
        #[arg(short = 't', long, default_value = "0")]
        threads: usize,
    },

    /// Search query sequences against a k-mer index
    Search {
        /// Query FASTA/FASTQ file
        #[arg(short, long)]
        query: String,

        /// Index file created by `createindex`
        #[arg(short, long)]
        index: String,

        /// Output result file; `<output>.index` is written next to it
        #[arg(short, long)]
        output: String,

        /// K-mer length (must match the index)
        #[arg(short, long)]
        k: Option<usize>,

        /// Alphabet size (must match the index)
        #[arg(long = "alph-size")]
        alph_size: Option<usize>,

        /// Spaced k-mer mode (must match the index)
        #[arg(long = "spaced-kmer-mode")]
        spaced_kmer_mode: Option<u8>,

        /// Composition bias correction (must match the index)
        #[arg(long = "comp-bias-corr")]
        comp_bias_corr: Option<u8>,

        /// Query sequence type: nucl or aa (default: the index type)
        #[arg(long = "seq-type")]
        seq_type: Option<SeqType>,

        /// K-mers kept per query sequence (0 = all)
        #[arg(long = "kmer-per-seq", default_value = "0")]
        kmer_per_seq: usize,

        /// Memory limit for seed buffers, e.g. 512M or 8G (default: 90% of RAM)
        #[arg(long = "split-memory-limit")]
        split_memory_limit: Option<String>,

        /// Gzip-compress result records
        #[arg(long)]
        compressed: bool,

        /// Number of threads (0 = all available cores)
        #[arg(short = 't', long, default_value = "0")]
        threads: usize,

        /// Directory for shard temp files
        #[arg(long = "tmp-dir")]
        tmp_dir: Option<PathBuf>,

        /// Force the number of shards
        #[arg(long)]
        shards: Option<usize>,

        /// Fail instead of growing when a shard exceeds its seed estimate
        #[arg(long = "strict-capacity")]
        strict_capacity: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing: use RUST_LOG if set, otherwise default to info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Createindex {
            input,
            output,
            k,
            alph_size,
            spaced_kmer_mode,
            comp_bias_corr,
            seq_type,
            threads,
        } => {
            createindex_command(
                input,
                output,
                k,
                alph_size,
                spaced_kmer_mode != 0,
                comp_bias_corr != 0,
                seq_type,
                threads,
            )?;
        }
        Commands::Search {
            query,
            index,
            output,
            k,
            alph_size,
            spaced_kmer_mode,
            comp_bias_corr,
            seq_type,
            kmer_per_seq,
            split_memory_limit,
            compressed,
            threads,
            tmp_dir,
            shards,
            strict_capacity,
            verbose,
        } => {
            let memory_limit_bytes = split_memory_limit
                .as_deref()
                .map(parse_memory_limit)
                .transpose()?;
            let mut config = SearchConfig {
                kmer_size: k,
                alphabet_size: alph_size,
                spaced_kmer: spaced_kmer_mode.map(|v| v != 0),
                comp_bias_corr: comp_bias_corr.map(|v| v != 0),
                kmers_per_sequence: kmer_per_seq,
                memory_limit_bytes,
                compressed,
                num_threads: threads,
                capacity_policy: if strict_capacity {
                    CapacityPolicy::Fail
                } else {
                    CapacityPolicy::Grow
                },
                shards,
                verbose,
                ..SearchConfig::default()
            };
            if let Some(tmp_dir) = tmp_dir {
                config.tmp_dirname = tmp_dir;
            }
            search_command(query, index, output, seq_type, config)?;
        }
    }

    Ok(())
}

/// Build a k-mer index from FASTA/FASTQ input
#[allow(clippy::too_many_arguments)]
fn createindex_command(
    input: String,
    output: Option<String>,
    k: usize,
    alph_size: Option<usize>,
    spaced_kmer: bool,
    comp_bias_corr: bool,
    seq_type: SeqType,
    threads: usize,
) -> anyhow::Result<()> {
    info!("Creating k-mer index...");
    info!("  Input: {}", input);
    info!("  k: {}", k);
    info!("  Sequence type: {}", seq_type);

    let targets = parse_fasta_file(&input, seq_type)?;
    info!("  Loaded {} sequences", targets.len());

    let alphabet = match alph_size {
        Some(size) => Alphabet::for_params(seq_type, size)?,
        None if seq_type.is_nucleotide() => Alphabet::nucleotide(),
        None => Alphabet::amino_acid(),
    };

    let pool = rayon_pool(threads)?;
    let index = pool.install(|| {
        MemoryKmerIndex::build(&targets, k, spaced_kmer, comp_bias_corr, &alphabet)
    })?;

    let output_path = output.unwrap_or_else(|| format!("{}.kmi", input));
    KmerIndexWriter::new(&output_path).write(index.metadata(), index.as_slice())?;
    info!("Index written to {}", output_path);

    Ok(())
}

fn rayon_pool(threads: usize) -> anyhow::Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create thread pool: {e}"))
}

/// Search query sequences against an index file
fn search_command(
    query: String,
    index: String,
    output: String,
    seq_type: Option<SeqType>,
    config: SearchConfig,
) -> anyhow::Result<()> {
    info!("Loading index from {}...", index);
    let mut index = KmerIndexFile::open(&index)?;
    let query_type = seq_type.unwrap_or(index.metadata().seq_type);

    let mut queries = parse_fasta_file(&query, query_type)?;
    info!("Loaded {} query sequences", queries.len());
    if queries.is_empty() {
        warn!("Query file {} contains no sequences", query);
    }

    let search = KmerSearch::new(config)?;
    let mut writer = ResultDbWriter::create(&output, search.config().compressed)?;
    let stats = search.run(&mut queries, &mut index, &mut writer)?;

    info!(
        "Wrote {} hits for {} targets to {} ({} shard(s))",
        stats.hits, stats.targets, output, stats.shards
    );
    Ok(())
}

/// Parse FASTA/FASTQ file into a sequence collection keyed by record order
fn parse_fasta_file(path: &str, seq_type: SeqType) -> anyhow::Result<SequenceDb> {
    use needletail::parse_fastx_file;

    let mut db = SequenceDb::new(seq_type);
    let mut reader = parse_fastx_file(path)?;

    let mut ordinal: usize = 0;
    while let Some(record) = reader.next() {
        let record = record?;
        let key = u32::try_from(ordinal)
            .map_err(|_| anyhow::anyhow!("{} holds more than {} sequences", path, u32::MAX))?;
        let seq = record.seq().to_ascii_uppercase();
        db.push(key, &seq);
        ordinal += 1;
    }
    info!(
        "  Read {} residues from {} (longest sequence: {})",
        db.total_residues(),
        path,
        db.max_len()
    );

    Ok(db)
}

/// Parse a memory size such as `1000`, `512K`, `64M`, `8G` or `1T`
/// (binary units, optional trailing `B`)
fn parse_memory_limit(value: &str) -> anyhow::Result<u64> {
    let trimmed = value.trim();
    let upper = trimmed.to_ascii_uppercase();
    let digits = upper.strip_suffix('B').unwrap_or(&upper);
    let (number, multiplier) = match digits.chars().last() {
        Some('K') => (&digits[..digits.len() - 1], 1u64 << 10),
        Some('M') => (&digits[..digits.len() - 1], 1u64 << 20),
        Some('G') => (&digits[..digits.len() - 1], GIB),
        Some('T') => (&digits[..digits.len() - 1], 1u64 << 40),
        _ => (digits, 1u64),
    };
    let number: u64 = number
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid memory limit '{}'", value))?;
    number
        .checked_mul(multiplier)
        .ok_or_else(|| anyhow::anyhow!("Memory limit '{}' is too large", value))
}
