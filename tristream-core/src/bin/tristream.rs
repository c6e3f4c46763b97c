//! Tristream CLI - most frequent word trigrams
//!
//! # Usage
//!
//! ```bash
//! # Read one or more files
//! tristream -f book.txt --fpath other.txt
//!
//! # Read standard input
//! cat book.txt | tristream
//!
//! # Case-folded top 20 with debug logging on stderr
//! tristream -f book.txt --lowercase --top 20 -vv
//! ```
//!
//! Each result line has the form `<w1> <w2> <w3> - <count>`, highest count
//! first.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tristream_core::{InputSource, Pipeline, PipelineConfig};
use tristream_types::{
    DEFAULT_BATCH_SIZE, DEFAULT_FAN_OUT, DEFAULT_PATTERN, DEFAULT_QUEUE_CAPACITY, DEFAULT_TOP_N,
};

/// Tristream - concurrent word trigram counter
#[derive(Parser, Debug)]
#[command(name = "tristream")]
#[command(about = "Report the most frequent word trigrams of text streams")]
#[command(version)]
struct Cli {
    /// Input file; repeat for several. Reads stdin when absent
    #[arg(short = 'f', long = "fpath", value_name = "PATH")]
    fpath: Vec<PathBuf>,

    /// Tokens per batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Number of parallel normalizer workers
    #[arg(long, default_value_t = DEFAULT_FAN_OUT)]
    fan_out: usize,

    /// Number of trigrams to report
    #[arg(long, default_value_t = DEFAULT_TOP_N)]
    top: usize,

    /// Characters matching this pattern are removed from each word
    #[arg(long, default_value = DEFAULT_PATTERN)]
    pattern: String,

    /// Items buffered between stages
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Lowercase words before counting
    #[arg(long)]
    lowercase: bool,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn config(&self) -> Result<PipelineConfig> {
        PipelineConfig::builder()
            .batch_size(self.batch_size)
            .fan_out(self.fan_out)
            .top_n(self.top)
            .pattern(self.pattern.as_str())
            .queue_capacity(self.queue_capacity)
            .lowercase(self.lowercase)
            .build()
            .context("invalid configuration")
    }
}

/// Opens every path up front so a bad path fails before any work starts.
fn open_sources(paths: &[PathBuf]) -> Result<Vec<InputSource>> {
    paths
        .iter()
        .map(|path| -> Result<InputSource> {
            let file = File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            Ok(InputSource::new(path.display().to_string(), file))
        })
        .collect()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();

    let pipeline = Pipeline::new(cli.config()?)?;
    let sources = open_sources(&cli.fpath)?;
    if sources.is_empty() {
        info!("no input files given, reading stdin");
    }

    let top = pipeline.run(sources)?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for entry in &top {
        writeln!(out, "{entry}")?;
    }
    out.flush()?;

    Ok(())
}
