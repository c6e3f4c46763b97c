//! Streaming word-trigram frequency counter.
//!
//! - [`analyzer`]: tokenizer, normalizer and trigram counter
//! - [`pipeline`]: the concurrent stage graph built from them
//! - [`topn`]: bounded selection of the most frequent entries

#![warn(missing_docs)]

pub mod analyzer;
pub mod pipeline;
pub mod topn;

pub use pipeline::{InputSource, Pipeline};
pub use topn::{select_top, TopN};
pub use tristream_types::{PipelineConfig, PipelineError, TrigramCount};
