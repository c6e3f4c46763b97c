//! Pipeline Benchmarking Tool
//!
//! This binary measures the throughput of the trigram pipeline on a large text
//! file, stage by stage and end to end.
//!
//! ## What It Benchmarks
//!
//! 1. **Tokenize**: Splitting the file into overlapping batches
//! 2. **Normalize**: Stripping excluded characters from every batch (one thread)
//! 3. **Count**: Aggregating trigrams of pre-normalized batches (one thread)
//! 4. **Pipeline**: The full concurrent graph including top-N selection
//!
//! ## Usage
//!
//! ```bash
//! # Default fan-out
//! ./target/release/pipeline_bench /path/to/corpus.txt
//!
//! # Narrower normalizer pool for the pipeline run
//! ./target/release/pipeline_bench /path/to/corpus.txt 8
//! ```
//!
//! ## Example Output
//!
//! ```text
//! === Count ===
//! --------------------------------
//! Mode        : Count
//! Elapsed     : 0.912 s
//! Throughput  : 0.231 GiB/s
//! Items       : 41_902_113
//! Items/sec   : 45_945_299
//! --------------------------------
//! ```
//!
//! Build with `--release` and use an input of 100MB or more for stable numbers.

use std::env;
use std::fs;
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tristream_core::analyzer::trigram::count_trigrams;
use tristream_core::analyzer::{BatchTokenizer, TextNormalizer, TrigramCounter};
use tristream_core::{InputSource, Pipeline, PipelineConfig};
use tristream_types::{PipelineError, TokenBatch, DEFAULT_BATCH_SIZE};

const WARMUP_RUNS: usize = 1;
const MEASURE_RUNS: usize = 5;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: pipeline_bench <path> [fan_out]");
        std::process::exit(1);
    }

    let path = &args[1];
    let fan_out = match args.get(2) {
        Some(n) => n.parse()?,
        None => PipelineConfig::default().fan_out,
    };

    println!("Loading file...");
    let bytes: Arc<[u8]> = fs::read(path)?.into();
    let pipeline = Pipeline::new(PipelineConfig::builder().fan_out(fan_out).build()?)?;

    println!("File size: {}", fmt_bytes(bytes.len() as u64));
    println!("Fan-out:   {}\n", pipeline.config().fan_out);

    let batches = bench_tokenize(&bytes)?;
    let normalized = bench_normalize(&bytes, batches)?;
    bench_count(&bytes, &normalized)?;
    bench_pipeline(&bytes, &pipeline)?;

    Ok(())
}

fn tokenize(bytes: &[u8]) -> anyhow::Result<Vec<TokenBatch>> {
    let batches = BatchTokenizer::new(bytes, "bench", DEFAULT_BATCH_SIZE)
        .collect::<Result<Vec<_>, PipelineError>>()?;
    Ok(batches)
}

fn normalize(normalizer: &TextNormalizer, batches: &mut [TokenBatch]) {
    for batch in batches {
        normalizer.normalize_batch(batch);
    }
}

fn token_total(batches: &[TokenBatch]) -> u64 {
    batches.iter().map(|b| b.len() as u64).sum()
}

fn bench_tokenize(bytes: &[u8]) -> anyhow::Result<Vec<TokenBatch>> {
    println!("=== Tokenize ===");

    let batches = tokenize(bytes)?;
    let elapsed = time(|| {
        std::hint::black_box(tokenize(bytes)?);
        Ok(())
    })?;

    print_perf("Tokenize", bytes.len(), elapsed, token_total(&batches));
    Ok(batches)
}

fn bench_normalize(
    bytes: &[u8],
    mut batches: Vec<TokenBatch>,
) -> anyhow::Result<Vec<TokenBatch>> {
    let normalizer = TextNormalizer::default();

    println!("=== Normalize ===");

    let elapsed = time(|| {
        let mut work = batches.clone();
        normalize(&normalizer, &mut work);
        std::hint::black_box(work);
        Ok(())
    })?;

    print_perf("Normalize", bytes.len(), elapsed, token_total(&batches));
    normalize(&normalizer, &mut batches);
    Ok(batches)
}

fn bench_count(bytes: &[u8], batches: &[TokenBatch]) -> anyhow::Result<()> {
    println!("=== Count ===");

    let elapsed = time(|| {
        let mut counter = TrigramCounter::new();
        for batch in batches {
            counter.observe_batch(batch);
        }
        std::hint::black_box(counter.len());
        Ok(())
    })?;

    let trigrams = batches.iter().map(|b| count_trigrams(b.len()) as u64).sum();
    print_perf("Count", bytes.len(), elapsed, trigrams);
    Ok(())
}

fn bench_pipeline(bytes: &Arc<[u8]>, pipeline: &Pipeline) -> anyhow::Result<()> {
    println!("=== Pipeline (concurrent) ===");

    let mut results = 0;
    let elapsed = time(|| {
        let source = InputSource::new("bench", Cursor::new(Arc::clone(bytes)));
        results = pipeline.run(vec![source])?.len() as u64;
        Ok(())
    })?;

    print_perf("Pipeline", bytes.len(), elapsed, 0);
    println!("Results     : {}\n", fmt_count(results));
    Ok(())
}

/// Runs `f` for the warmup rounds, then returns its mean time over the
/// measured rounds.
fn time<F>(mut f: F) -> anyhow::Result<Duration>
where
    F: FnMut() -> anyhow::Result<()>,
{
    for _ in 0..WARMUP_RUNS {
        f()?;
    }

    let start = Instant::now();
    for _ in 0..MEASURE_RUNS {
        f()?;
    }
    Ok(start.elapsed() / MEASURE_RUNS as u32)
}

fn print_perf(label: &str, input_bytes: usize, elapsed: Duration, items: u64) {
    let secs = elapsed.as_secs_f64();
    let gib = input_bytes as f64 / GIB;

    println!("--------------------------------");
    println!("Mode        : {label}");
    println!("Elapsed     : {secs:.3} s");
    println!("Throughput  : {:.3} GiB/s", gib / secs);

    if items > 0 {
        println!("Items       : {}", fmt_count(items));
        println!("Items/sec   : {}", fmt_count((items as f64 / secs) as u64));
    }

    println!("--------------------------------\n");
}

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

fn fmt_bytes(b: u64) -> String {
    const UNITS: [(&str, f64); 3] = [("GiB", GIB), ("MiB", 1024.0 * 1024.0), ("KiB", 1024.0)];

    UNITS
        .iter()
        .find(|(_, size)| b as f64 >= *size)
        .map(|(unit, size)| format!("{:.2} {unit}", b as f64 / size))
        .unwrap_or_else(|| format!("{b} B"))
}

/// Formats `n` with `_` between digit groups, e.g. `1_234_567`.
fn fmt_count(n: u64) -> String {
    let digits = n.to_string();
    let head = digits.len() % 3;

    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    out.push_str(&digits[..head]);
    for (i, group) in digits.as_bytes()[head..].chunks(3).enumerate() {
        if head > 0 || i > 0 {
            out.push('_');
        }
        out.extend(group.iter().map(|&d| d as char));
    }
    out
}
