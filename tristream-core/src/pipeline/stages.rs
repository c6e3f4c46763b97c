//! Stage workers.
//!
//! Each function spawns one stage instance on the [`Scheduler`] and returns
//! its output stream. Items are `Result`s: a failing stage sends its error
//! downstream as the last item and then stops, so the failure reaches the
//! caller through the same stream that carries the data.

use std::fmt;
use std::io::{self, Read};

use crossbeam_channel::Receiver;
use tracing::{debug, warn};
use tristream_types::{PipelineError, TokenBatch, TrigramCount};

use super::scheduler::Scheduler;
use crate::analyzer::{BatchTokenizer, TextNormalizer, TrigramCounter};

/// One element of a stage stream.
pub type Item<T> = Result<T, PipelineError>;

/// Stream of token batches.
pub type BatchStream = Receiver<Item<TokenBatch>>;

/// Stream of aggregated counts.
pub type CountStream = Receiver<Item<TrigramCount>>;

/// A named byte source feeding one tokenizer.
pub struct InputSource {
    name: String,
    reader: Box<dyn Read + Send>,
}

impl InputSource {
    /// Wraps an open reader.
    pub fn new(name: impl Into<String>, reader: impl Read + Send + 'static) -> Self {
        Self {
            name: name.into(),
            reader: Box::new(reader),
        }
    }

    /// Standard input, used when no source is given.
    pub fn stdin() -> Self {
        Self::new("<stdin>", io::stdin())
    }

    /// Display name used in errors and logs.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputSource")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Spawns a tokenizer reading `source` to completion.
///
/// A read error is sent as the final item.
pub fn spawn_tokenizer(
    scheduler: &mut Scheduler,
    source: InputSource,
    batch_size: usize,
) -> Result<BatchStream, PipelineError> {
    scheduler.spawn("tokenize", move |tx| {
        let InputSource { name, reader } = source;
        let mut batches = 0u64;

        for item in BatchTokenizer::new(reader, name.as_str(), batch_size) {
            if let Err(e) = &item {
                warn!(source = %name, error = %e, "source failed");
            }
            if tx.send(item).is_err() {
                debug!(source = %name, "tokenizer consumer disconnected");
                return;
            }
            batches += 1;
        }

        debug!(source = %name, batches, "tokenizer finished");
    })
}

/// Spawns one normalizer replica consuming `input`.
///
/// Replicas sharing a clone of the same `input` split its items between them.
pub fn spawn_normalizer(
    scheduler: &mut Scheduler,
    normalizer: TextNormalizer,
    input: BatchStream,
) -> Result<BatchStream, PipelineError> {
    scheduler.spawn("normalize", move |tx| {
        for item in input {
            let item = item.map(|mut batch| {
                normalizer.normalize_batch(&mut batch);
                batch
            });
            if tx.send(item).is_err() {
                return;
            }
        }
    })
}

/// Spawns the single aggregator counting every batch of `input`.
///
/// Counts are emitted only after `input` completes. An error item is
/// forwarded and ends the stream without any counts.
pub fn spawn_aggregator(
    scheduler: &mut Scheduler,
    input: BatchStream,
) -> Result<CountStream, PipelineError> {
    scheduler.spawn("aggregate", move |tx| {
        let mut counter = TrigramCounter::new();

        for item in input {
            match item {
                Ok(batch) => counter.observe_batch(&batch),
                Err(e) => {
                    let _ = tx.send(Err(e));
                    return;
                }
            }
        }

        debug!(
            batches = counter.batches(),
            distinct = counter.len(),
            "aggregation finished"
        );

        for entry in counter.into_counts() {
            if tx.send(Ok(entry)).is_err() {
                return;
            }
        }
    })
}
