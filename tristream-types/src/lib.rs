//! Core types shared across the tristream pipeline.
//!
//! This crate holds the values that cross stage boundaries:
//!
//! - **Batches**: [`TokenBatch`], the unit of work flowing from tokenizers to
//!   normalizers to the aggregator
//! - **Counts**: [`TrigramCount`], emitted by the aggregator and ranked by the
//!   top-N selector
//! - **Configuration**: [`PipelineConfig`] with its defaults and builder
//! - **Errors**: [`PipelineError`], the typed failure carried through every
//!   stage's completion signal

#![warn(missing_docs)]

use core::fmt;
use std::io;

/// Tokens per batch before the overlap carry-over is emitted.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Number of parallel normalizer workers.
pub const DEFAULT_FAN_OUT: usize = 1000;

/// Capacity of the final result set.
pub const DEFAULT_TOP_N: usize = 100;

/// Characters matched by this pattern are stripped from every token.
pub const DEFAULT_PATTERN: &str = r"[^\w]";

/// Bound on every inter-stage queue, in items.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Number of tokens shared by consecutive batches of one source.
///
/// Two tokens is exactly the context a 3-word window needs to straddle a cut.
pub const BATCH_OVERLAP: usize = 2;

/// An ordered chunk of tokens from one source.
///
/// Consecutive batches of the same source overlap by [`BATCH_OVERLAP`] tokens.
pub type TokenBatch = Vec<String>;

/// A trigram key and the number of times it occurred.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrigramCount {
    /// Three normalized tokens joined by single spaces.
    pub key: String,
    /// Occurrences across all input streams.
    pub count: u64,
}

impl TrigramCount {
    /// Creates a new count entry.
    #[inline]
    pub fn new(key: impl Into<String>, count: u64) -> Self {
        Self {
            key: key.into(),
            count,
        }
    }
}

impl fmt::Display for TrigramCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.key, self.count)
    }
}

/// Errors raised while configuring or running the pipeline.
///
/// Every variant is fatal for the run that produced it.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A configuration value is out of range.
    #[error("invalid configuration: {field} {reason}")]
    InvalidConfig {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: &'static str,
    },
    /// The normalization pattern failed to compile.
    #[error("invalid normalization pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// The pattern as configured.
        pattern: String,
        /// Compiler diagnostic.
        reason: String,
    },
    /// Reading an already-open source failed.
    #[error("failed to read {source_name}: {source}")]
    Read {
        /// Display name of the source.
        source_name: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The operating system refused to start a worker thread.
    #[error("failed to spawn worker {worker}: {source}")]
    Spawn {
        /// Name of the worker that could not start.
        worker: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A worker thread panicked before finishing its stream.
    #[error("worker {worker} panicked")]
    WorkerPanicked {
        /// Name of the panicked worker.
        worker: String,
    },
}

/// Pipeline tuning options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Tokens accumulated before a batch is emitted (a batch holds `batch_size + 1`).
    pub batch_size: usize,
    /// Number of parallel normalizer workers.
    pub fan_out: usize,
    /// Maximum number of entries in the result.
    pub top_n: usize,
    /// Regex whose matches are removed from each token.
    pub pattern: String,
    /// Bound on every inter-stage queue. Zero means rendezvous handoff.
    pub queue_capacity: usize,
    /// Lowercase tokens after stripping.
    pub lowercase: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            fan_out: DEFAULT_FAN_OUT,
            top_n: DEFAULT_TOP_N,
            pattern: DEFAULT_PATTERN.to_owned(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            lowercase: false,
        }
    }
}

impl PipelineConfig {
    /// Creates a builder starting from the defaults.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Checks that every numeric option is usable.
    ///
    /// # Errors
    /// Returns [`PipelineError::InvalidConfig`] for a zero batch size, fan-out or top-N.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.batch_size == 0 {
            return Err(PipelineError::InvalidConfig {
                field: "batch_size",
                reason: "must be at least 1",
            });
        }
        if self.fan_out == 0 {
            return Err(PipelineError::InvalidConfig {
                field: "fan_out",
                reason: "must be at least 1",
            });
        }
        if self.top_n == 0 {
            return Err(PipelineError::InvalidConfig {
                field: "top_n",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Sets the batch size.
    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n;
        self
    }

    /// Sets the number of normalizer workers.
    pub fn fan_out(mut self, n: usize) -> Self {
        self.config.fan_out = n;
        self
    }

    /// Sets the result capacity.
    pub fn top_n(mut self, n: usize) -> Self {
        self.config.top_n = n;
        self
    }

    /// Sets the normalization pattern.
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.pattern = pattern.into();
        self
    }

    /// Sets the queue bound.
    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.config.queue_capacity = n;
        self
    }

    /// Enables or disables lowercasing.
    pub fn lowercase(mut self, enabled: bool) -> Self {
        self.config.lowercase = enabled;
        self
    }

    /// Validates and returns the configuration.
    ///
    /// # Errors
    /// See [`PipelineConfig::validate`].
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
