//! Concurrent Trigram Pipeline
//!
//! Wires the analyzer components into a graph of worker threads connected by
//! bounded queues:
//!
//! 1. **Tokenize**: one worker per input source produces overlapping batches
//! 2. **Normalize**: a fixed-width pool of replicas cleans batches in parallel
//! 3. **Aggregate**: a single worker owns the count map
//! 4. **Select**: the caller keeps the N most frequent trigrams
//!
//! ## Errors
//!
//! Stream items are `Result`s. A read failure travels downstream as an error
//! item and ends the run; a panicking worker closes its output stream and is
//! reported when the run joins its workers. Dropping a consumer disconnects
//! every producer upstream of it, so no worker outlives an abandoned run
//! except one blocked inside a read.
//!
//! ## Usage
//!
//! ```
//! use tristream_core::pipeline::{InputSource, Pipeline};
//! use tristream_types::PipelineConfig;
//!
//! let config = PipelineConfig::builder().fan_out(4).build().unwrap();
//! let top = Pipeline::new(config)
//!     .unwrap()
//!     .run(vec![InputSource::new("inline", &b"a a a a"[..])])
//!     .unwrap();
//!
//! assert_eq!(top[0].to_string(), "a a a - 2");
//! ```

pub mod runner;
pub mod scheduler;
pub mod stages;

pub use runner::Pipeline;
pub use scheduler::Scheduler;
pub use stages::{BatchStream, CountStream, InputSource, Item};
