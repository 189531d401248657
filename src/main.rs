//! marker-array CLI entry point
//!
//! Scans haplotypes out of a reference and VCFs, merges their marker events,
//! and turns an index engine's permutation into a compressed marker array.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use marker_array::core::{Endian, FieldLayout, MarkerConfig, RunPolicy, WordWidth};
use marker_array::pipeline::{self, BuildOptions, DumpKind, DumpOptions, MergeOptions, ScanOptions};
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum WidthArg {
    #[value(name = "32")]
    W32,
    #[value(name = "64")]
    W64,
}

impl From<WidthArg> for WordWidth {
    fn from(arg: WidthArg) -> Self {
        match arg {
            WidthArg::W32 => WordWidth::W32,
            WidthArg::W64 => WordWidth::W64,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EndianArg {
    Little,
    Big,
}

impl From<EndianArg> for Endian {
    fn from(arg: EndianArg) -> Self {
        match arg {
            EndianArg::Little => Endian::Little,
            EndianArg::Big => Endian::Big,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyArg {
    /// Equal markers extend a run across unmarked ranks
    Relaxed,
    /// Any rank gap closes a run
    Contiguous,
}

impl From<PolicyArg> for RunPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Relaxed => RunPolicy::Relaxed,
            PolicyArg::Contiguous => RunPolicy::Contiguous,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DumpKindArg {
    Events,
    Sparse,
    Runs,
    Permutation,
}

impl From<DumpKindArg> for DumpKind {
    fn from(arg: DumpKindArg) -> Self {
        match arg {
            DumpKindArg::Events => DumpKind::Events,
            DumpKindArg::Sparse => DumpKind::SparseArray,
            DumpKindArg::Runs => DumpKind::Runs,
            DumpKindArg::Permutation => DumpKind::Permutation,
        }
    }
}

#[derive(Parser)]
#[command(name = "marker-array")]
#[command(about = "Variant marker arrays for haplotype-aware text indexes")]
#[command(version)]
struct Cli {
    /// Binary word width in bits
    #[arg(long, global = true, default_value = "64")]
    width: WidthArg,

    /// Byte order of binary words
    #[arg(long, global = true, default_value = "little")]
    endian: EndianArg,

    /// Positions the index engine inserts after every contig
    #[arg(long, global = true, default_value = "0")]
    separator: u64,

    /// Contig id field width in bits (default: 14 for 64-bit words, 6 for 32-bit)
    #[arg(long, global = true)]
    contig_bits: Option<u32>,

    /// Reference position field width in bits (default: 46 for 64-bit words, 22 for 32-bit)
    #[arg(long, global = true)]
    position_bits: Option<u32>,

    /// Run-length policy for compressed marker arrays
    #[arg(long, global = true, default_value = "relaxed")]
    policy: PolicyArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct haplotypes and write per-worker marker events
    Scan {
        /// Reference FASTA (plain, gzip or bzip2)
        reference: PathBuf,
        /// Phased VCF files sharing one sample list
        #[arg(required = true)]
        vcfs: Vec<PathBuf>,
        /// Output prefix
        #[arg(short = 'o', long)]
        prefix: PathBuf,
        /// Number of worker threads
        #[arg(short = 't', long, default_value = "1")]
        threads: usize,
    },
    /// Place worker marker events into one coordinate space
    Merge {
        /// Output prefix used by scan
        prefix: PathBuf,
        /// Also concatenate worker FASTA files into <prefix>.fa
        #[arg(long)]
        fasta: bool,
    },
    /// Stream a permutation into a compressed marker array
    Build {
        /// Output prefix used by merge
        prefix: PathBuf,
        /// Permutation file, or - for standard input
        #[arg(short = 'p', long, default_value = "-")]
        permutation: PathBuf,
        /// Marker event file (default: <prefix>.mps)
        #[arg(short = 'e', long)]
        events: Option<PathBuf>,
        /// Also write the uncompressed sparse array <prefix>.sma
        #[arg(long)]
        sparse: bool,
    },
    /// Print a binary marker file as text
    Dump {
        /// Input file
        input: PathBuf,
        /// File layout (default: from extension)
        #[arg(short = 'k', long)]
        kind: Option<DumpKindArg>,
        /// Print packed words instead of decoded fields
        #[arg(long)]
        raw: bool,
        /// One line per rank for compressed runs
        #[arg(long)]
        expand: bool,
    },
    /// Print the marker at each rank of a compressed marker array
    Lookup {
        /// Compressed marker array (.ma)
        input: PathBuf,
        /// Ranks to look up
        #[arg(required = true)]
        ranks: Vec<u64>,
        /// Print packed words instead of decoded fields
        #[arg(long)]
        raw: bool,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let start = Instant::now();

    let width: WordWidth = cli.width.into();
    let defaults = width.default_layout();
    let layout = FieldLayout::new(
        cli.contig_bits.unwrap_or(defaults.contig_bits),
        cli.position_bits.unwrap_or(defaults.position_bits),
    );
    let config = MarkerConfig::with_width(width)
        .layout(layout)
        .endian(cli.endian.into())
        .separator_len(cli.separator)
        .run_policy(cli.policy.into());
    config
        .validate()
        .context("invalid --width/--contig-bits/--position-bits combination")?;

    match cli.command {
        Commands::Scan { reference, vcfs, prefix, threads } => {
            eprintln!("Scanning {:?} with {} VCF file(s) -> {:?}", reference, vcfs.len(), prefix);
            let report = pipeline::run_scan(&ScanOptions {
                reference,
                vcfs,
                prefix,
                threads,
                config,
            })?;

            eprintln!("\n=== Scan Statistics ===");
            eprintln!("Contigs:         {}", report.contigs);
            eprintln!("Variants:        {}", report.variants);
            eprintln!("Workers:         {}", report.workers.len());
            eprintln!("Markers:         {}", report.workers.iter().map(|w| w.markers).sum::<u64>());
            eprintln!("Applied:         {}", report.workers.iter().map(|w| w.applied).sum::<usize>());
            eprintln!("Skipped:         {}", report.workers.iter().map(|w| w.skipped).sum::<usize>());
            eprintln!("Failed workers:  {}", report.failed().len());
            eprintln!("Manifest:        {:?}", report.manifest);
            eprintln!("Time elapsed:    {:.2}s", start.elapsed().as_secs_f64());

            let failed = report.failed();
            if !failed.is_empty() {
                for worker in &failed {
                    eprintln!("  {}: {}", worker.label, worker.error.as_deref().unwrap_or("unknown error"));
                }
                anyhow::bail!("{} of {} workers failed", failed.len(), report.workers.len());
            }
        }

        Commands::Merge { prefix, fasta } => {
            eprintln!("Merging marker events for {:?}", prefix);
            let report = pipeline::run_merge(&MergeOptions {
                prefix,
                concat_fasta: fasta,
                config,
            })?;

            eprintln!("\n=== Merge Statistics ===");
            eprintln!("Workers:         {}", report.workers);
            eprintln!("Markers:         {}", report.markers);
            eprintln!("Text length:     {}", report.total_length);
            eprintln!("Events:          {:?}", report.events);
            if let Some(fasta) = &report.fasta {
                eprintln!("FASTA:           {:?}", fasta);
            }
            eprintln!("Time elapsed:    {:.2}s", start.elapsed().as_secs_f64());
        }

        Commands::Build { prefix, permutation, events, sparse } => {
            eprintln!("Building marker array {:?} from {:?}", prefix, permutation);
            let stats = pipeline::run_build(&BuildOptions {
                prefix,
                permutation,
                events,
                write_sparse: sparse,
                config,
                cancel: None,
            })?;

            eprintln!("\n=== Build Statistics ===");
            eprintln!("Ranks:           {}", stats.ranks);
            eprintln!("Marked ranks:    {}", stats.marked);
            eprintln!("Runs:            {}", stats.runs);
            eprintln!("Time elapsed:    {:.2}s", start.elapsed().as_secs_f64());
        }

        Commands::Dump { input, kind, raw, expand } => {
            let kind = match kind {
                Some(kind) => kind.into(),
                None => DumpKind::from_path(&input)
                    .with_context(|| format!("cannot tell the layout of {:?}; pass --kind", input))?,
            };
            let options = DumpOptions { kind, raw, expand, config };
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            pipeline::dump_file(&input, &options, &mut out)?;
        }

        Commands::Lookup { input, ranks, raw } => {
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            let marked = pipeline::lookup_ranks(&input, &ranks, raw, &config, &mut out)?;
            log::info!("{} of {} ranks marked", marked, ranks.len());
        }
    }

    Ok(())
}
