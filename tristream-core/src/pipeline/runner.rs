//! Pipeline assembly.
//!
//! ```text
//! source 0 ─ tokenize ─┐                 ┌─ normalize 0 ─┐
//! source 1 ─ tokenize ─┼─ merge ─ (K) ───┼─ normalize 1 ─┼─ merge ─ aggregate ─ top-N
//! source S ─ tokenize ─┘                 └─ normalize K ─┘
//! ```
//!
//! The top-N selection runs on the calling thread and is the final consumer
//! of the whole graph.

use tracing::{debug, info};
use tristream_types::{PipelineConfig, PipelineError, TrigramCount};

use super::scheduler::Scheduler;
use super::stages::{spawn_aggregator, spawn_normalizer, spawn_tokenizer, InputSource};
use crate::analyzer::{NormalizerConfig, TextNormalizer};
use crate::topn::select_top;

/// A validated, ready-to-run pipeline.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    normalizer: TextNormalizer,
}

impl Pipeline {
    /// Validates `config` and compiles its exclusion pattern.
    ///
    /// # Errors
    /// Returns [`PipelineError::InvalidConfig`] or
    /// [`PipelineError::InvalidPattern`] before any worker is started.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let normalizer = TextNormalizer::new(&NormalizerConfig {
            pattern: config.pattern.clone(),
            lowercase: config.lowercase,
        })?;

        Ok(Self { config, normalizer })
    }

    /// Configuration this pipeline runs with.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the pipeline over `sources` and returns the top trigrams,
    /// highest count first.
    ///
    /// With no sources, standard input is read instead. Trigrams never span
    /// two sources.
    ///
    /// # Errors
    /// Returns the first read error of any source, or
    /// [`PipelineError::WorkerPanicked`] if a stage died. No partial result is
    /// returned in either case.
    pub fn run(&self, sources: Vec<InputSource>) -> Result<Vec<TrigramCount>, PipelineError> {
        let sources = sources_or_stdin(sources);

        let config = &self.config;
        info!(
            sources = sources.len(),
            batch_size = config.batch_size,
            fan_out = config.fan_out,
            top_n = config.top_n,
            "starting pipeline"
        );

        let mut scheduler = Scheduler::new(config.queue_capacity);

        let token_streams = sources
            .into_iter()
            .map(|source| spawn_tokenizer(&mut scheduler, source, config.batch_size))
            .collect::<Result<Vec<_>, _>>()?;
        let tokens = scheduler.merge(token_streams)?;

        let normalized = scheduler.fan_out(config.fan_out, |s, _| {
            spawn_normalizer(s, self.normalizer.clone(), tokens.clone())
        })?;
        drop(tokens);
        let normalized = scheduler.merge(normalized)?;

        let counts = spawn_aggregator(&mut scheduler, normalized)?;
        debug!(workers = scheduler.workers(), "pipeline graph started");

        // On error the scheduler is dropped unjoined; a tokenizer may still be
        // blocked in a read.
        let top = select_top(config.top_n, counts)?;
        scheduler.join()?;

        info!(results = top.len(), "pipeline finished");
        Ok(top)
    }
}

/// Falls back to standard input when no source is given.
fn sources_or_stdin(sources: Vec<InputSource>) -> Vec<InputSource> {
    if sources.is_empty() {
        vec![InputSource::stdin()]
    } else {
        sources
    }
}
