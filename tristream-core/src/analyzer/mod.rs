//! Text analysis stages.
//!
//! This module provides the per-stream text processing components:
//! - **Tokenizer**: Splits a byte source into overlapping token batches
//! - **Normalizer**: Strips excluded characters from every token of a batch
//! - **Trigram**: Counts overlapping 3-word windows

pub mod normalizer;
pub mod tokenizer;
pub mod trigram;

pub use normalizer::{NormalizerConfig, TextNormalizer};
pub use tokenizer::BatchTokenizer;
pub use trigram::TrigramCounter;
