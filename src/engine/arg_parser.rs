use clap::Parser;
use std::path::PathBuf;

/// Sign a list of integers through the dual checksum → sharded checksum → aggregator pipeline.
#[derive(Clone, Parser)]
#[command(name = "signer")]
#[command(about = "Compute the combined hash-chain signature of a list of integers.")]
pub struct Cli {
    /// Integers to sign. Default: 0 1 1 2 3 5 8.
    #[arg(value_name = "INPUT", allow_negative_numbers = true)]
    pub inputs: Vec<i64>,

    /// Abort the run after this many seconds. 0 disables the timeout.
    #[arg(long, short = 't', value_parser = clap::value_parser!(u64))]
    pub timeout: Option<u64>,

    /// Capacity of each hand-off queue between stages.
    #[arg(long, value_parser = clap::value_parser!(usize))]
    pub channel_cap: Option<usize>,

    /// Worker threads per checksum stage. Default: available threads (at least 2).
    #[arg(long, short = 'j', value_parser = clap::value_parser!(usize))]
    pub workers: Option<usize>,

    /// Separator between the sorted per-input results.
    #[arg(long, short = 's')]
    pub separator: Option<String>,

    /// Settings file. Default: `.signer.toml` in the current directory, if present.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Verbose output and progress bar.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}
