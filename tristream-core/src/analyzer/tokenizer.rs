//! Streaming Batch Tokenizer
//!
//! This module turns one byte source into a lazy sequence of overlapping token
//! batches. It is the first stage of the pipeline: every input source gets its
//! own tokenizer, and the batches it yields are what the normalizers and the
//! trigram aggregator work on.
//!
//! ## What It Does
//!
//! Given a batch size of 3 and the input `"a b c d e f"`, it yields:
//!
//! ```text
//! ["a", "b", "c", "d"]
//! ["c", "d", "e", "f"]
//! ```
//!
//! A batch is emitted as soon as it holds `batch_size + 1` tokens, and the
//! next batch starts with the last two tokens of the previous one. Any 3-word
//! window that straddles the cut is therefore fully contained in the second
//! batch, and counting windows batch by batch counts every trigram of the
//! source exactly once.
//!
//! ## Reading
//!
//! The source is read in fixed-size chunks. Each chunk is cut after its last
//! whitespace character and the unterminated tail is kept for the next read,
//! so a token is never split across reads. ASCII separators are found with a
//! byte search; only a chunk without any of them is decoded to look for
//! Unicode spaces. Tokens are then taken from the cut region one at a time,
//! and reading stops as soon as a batch is complete, so at most one chunk
//! and one batch are buffered.
//!
//! ## Usage
//!
//! ```
//! use tristream_core::analyzer::tokenizer::BatchTokenizer;
//!
//! let batches: Vec<_> = BatchTokenizer::new("a b c d e f".as_bytes(), "<inline>", 3)
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//!
//! assert_eq!(batches.len(), 2);
//! assert_eq!(batches[1], ["c", "d", "e", "f"]);
//! ```

use std::io::{self, Read};
use std::mem;

use memchr::memrchr3;
use tristream_types::{PipelineError, TokenBatch, BATCH_OVERLAP};

/// Bytes requested from the source per read.
const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Reading,
    Drained,
    Done,
}

/// Lazy, single-pass iterator of overlapping token batches over a reader.
///
/// Yields `Ok(batch)` for each batch and at most one `Err` if the reader
/// fails, after which the iterator is exhausted.
pub struct BatchTokenizer<R> {
    reader: R,
    source_name: String,
    batch_size: usize,
    /// Raw bytes after the last cut.
    pending: Vec<u8>,
    /// Decoded text before the last cut, consumed from `cursor`.
    text: String,
    cursor: usize,
    batch: TokenBatch,
    /// Tokens in `batch` that have not been part of an emitted batch yet.
    unseen: usize,
    state: State,
}

impl<R: Read> BatchTokenizer<R> {
    /// Creates a tokenizer over `reader`.
    ///
    /// `batch_size` is clamped to at least 1.
    pub fn new(reader: R, source_name: impl Into<String>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            reader,
            source_name: source_name.into(),
            batch_size,
            pending: Vec::with_capacity(READ_CHUNK),
            text: String::new(),
            cursor: 0,
            batch: Vec::with_capacity(batch_size + 1),
            unseen: 0,
            state: State::Reading,
        }
    }

    /// Display name of the source, used in errors and logs.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Reads one chunk and moves every complete token of `pending` into `text`.
    fn fill(&mut self) -> io::Result<()> {
        let start = self.pending.len();
        self.pending.resize(start + READ_CHUNK, 0);

        let read = loop {
            match self.reader.read(&mut self.pending[start..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.pending.truncate(start);
                    return Err(e);
                }
            }
        };
        self.pending.truncate(start + read);

        if read == 0 {
            let rest = mem::take(&mut self.pending);
            self.decode(&rest);
            self.state = State::Drained;
            return Ok(());
        }

        if let Some(cut) = cut_point(&self.pending, start) {
            let tail = self.pending.split_off(cut);
            let complete = mem::replace(&mut self.pending, tail);
            self.decode(&complete);
        }

        Ok(())
    }

    fn decode(&mut self, bytes: &[u8]) {
        self.text = String::from_utf8_lossy(bytes).into_owned();
        self.cursor = 0;
    }

    /// Pushes tokens from `text` until a batch completes or `text` runs out.
    fn next_from_text(&mut self) -> Option<TokenBatch> {
        loop {
            let rest = &self.text[self.cursor..];
            let trimmed = rest.trim_start();
            if trimmed.is_empty() {
                self.text.clear();
                self.cursor = 0;
                return None;
            }

            let len = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
            let token = trimmed[..len].to_owned();
            self.cursor += rest.len() - trimmed.len() + len;

            if let Some(batch) = self.push_token(token) {
                return Some(batch);
            }
        }
    }

    #[inline]
    fn push_token(&mut self, token: String) -> Option<TokenBatch> {
        self.batch.push(token);
        self.unseen += 1;

        if self.batch.len() <= self.batch_size {
            return None;
        }

        let carry = self.batch[self.batch.len() - BATCH_OVERLAP..].to_vec();
        let mut next = Vec::with_capacity(self.batch_size + 1);
        next.extend(carry);
        self.unseen = 0;
        Some(mem::replace(&mut self.batch, next))
    }

    /// Takes the remainder if it holds anything beyond the carried overlap.
    fn flush(&mut self) -> Option<TokenBatch> {
        let unseen = mem::take(&mut self.unseen);
        let batch = mem::take(&mut self.batch);
        (unseen > 0).then_some(batch)
    }
}

#[inline]
fn is_continuation(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}

/// Offset just past the last whitespace character in `bytes[from..]`.
///
/// `from` must be less than `bytes.len()`. It may fall inside a multi-byte
/// character; a separator straddling it is still found.
fn cut_point(bytes: &[u8], from: usize) -> Option<usize> {
    let fresh = &bytes[from..];
    let ascii = match (
        memrchr3(b' ', b'\n', b'\t', fresh),
        memrchr3(b'\r', b'\x0B', b'\x0C', fresh),
    ) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };
    if let Some(offset) = ascii {
        return Some(from + offset + 1);
    }

    let mut begin = from;
    while begin > 0 && from - begin < 3 && is_continuation(bytes[begin]) {
        begin -= 1;
    }

    let mut offset = begin;
    let mut cut = None;
    for chunk in bytes[begin..].utf8_chunks() {
        let valid = chunk.valid();
        if let Some((i, c)) = valid.char_indices().rev().find(|(_, c)| c.is_whitespace()) {
            cut = Some(offset + i + c.len_utf8());
        }
        offset += valid.len() + chunk.invalid().len();
    }
    cut
}

impl<R: Read> Iterator for BatchTokenizer<R> {
    type Item = Result<TokenBatch, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(batch) = self.next_from_text() {
                return Some(Ok(batch));
            }

            match self.state {
                State::Done => return None,
                State::Drained => {
                    self.state = State::Done;
                    if let Some(batch) = self.flush() {
                        return Some(Ok(batch));
                    }
                }
                State::Reading => {
                    if let Err(source) = self.fill() {
                        self.state = State::Done;
                        return Some(Err(PipelineError::Read {
                            source_name: self.source_name.clone(),
                            source,
                        }));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn batches(input: &str, batch_size: usize) -> Vec<TokenBatch> {
        BatchTokenizer::new(input.as_bytes(), "test", batch_size)
            .collect::<Result<_, _>>()
            .unwrap()
    }

    /// Hands out one byte per `read` call.
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.split_first() {
                Some((&b, rest)) if !buf.is_empty() => {
                    buf[0] = b;
                    self.0 = rest;
                    Ok(1)
                }
                _ => Ok(0),
            }
        }
    }

    /// Yields `prefix` and then fails.
    struct Broken {
        prefix: Option<Vec<u8>>,
    }

    impl Read for Broken {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.prefix.take() {
                Some(bytes) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                None => Err(io::Error::new(io::ErrorKind::Other, "device lost")),
            }
        }
    }

    /// Interrupts every other call.
    struct Flaky<'a> {
        inner: &'a [u8],
        interrupt: bool,
    }

    impl Read for Flaky<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.interrupt = !self.interrupt;
            if self.interrupt {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "signal"));
            }
            self.inner.read(buf)
        }
    }

    #[test]
    fn short_input_is_one_batch() {
        assert_eq!(batches("a b c", 500), vec![vec!["a", "b", "c"]]);
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(batches("", 500).is_empty());
        assert!(batches(" \n\t ", 500).is_empty());
    }

    #[test]
    fn splits_on_any_whitespace_run() {
        assert_eq!(
            batches("  one\ttwo\n\nthree \r\n four\u{00A0}five  ", 500),
            vec![vec!["one", "two", "three", "four", "five"]]
        );
    }

    #[test]
    fn punctuation_stays_attached() {
        assert_eq!(batches("a. b. c.", 500), vec![vec!["a.", "b.", "c."]]);
    }

    #[test]
    fn emits_at_batch_size_plus_one() {
        let out = batches("a b c d e f", 3);
        assert_eq!(out, vec![vec!["a", "b", "c", "d"], vec!["c", "d", "e", "f"]]);
    }

    #[test]
    fn consecutive_batches_overlap_by_two() {
        let input: Vec<String> = (0..100).map(|i| format!("w{i}")).collect();
        let out = batches(&input.join(" "), 7);

        assert!(out.len() > 1);
        for pair in out.windows(2) {
            let prev = &pair[0];
            assert_eq!(prev.len(), 8);
            assert_eq!(&pair[1][..2], &prev[prev.len() - 2..]);
        }
    }

    #[test]
    fn carry_only_remainder_is_not_flushed() {
        // Exactly one full batch: the carry holds "c d" and nothing new.
        let out = batches("a b c d", 3);
        assert_eq!(out, vec![vec!["a", "b", "c", "d"]]);
    }

    #[test]
    fn short_final_batch_is_flushed() {
        let out = batches("a b c d e", 3);
        assert_eq!(out, vec![vec!["a", "b", "c", "d"], vec!["c", "d", "e"]]);
    }

    #[test]
    fn batch_size_one_still_progresses() {
        let out = batches("a b c d", 1);
        assert_eq!(
            out,
            vec![vec!["a", "b"], vec!["a", "b", "c"], vec!["b", "c", "d"]]
        );
    }

    #[test]
    fn tokens_survive_one_byte_reads() {
        let text = "alpha beta\ngamma  délta\tepsilon";
        let out: Vec<TokenBatch> = BatchTokenizer::new(Trickle(text.as_bytes()), "trickle", 500)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(out, vec![vec!["alpha", "beta", "gamma", "délta", "epsilon"]]);
    }

    #[test]
    fn token_longer_than_read_chunk() {
        let long = "x".repeat(READ_CHUNK * 2 + 17);
        let input = format!("a {long} b");
        let out = batches(&input, 500);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 3);
        assert_eq!(out[0][1].len(), long.len());
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let bytes = b"ok \xff\xfe bad";
        let out: Vec<TokenBatch> = BatchTokenizer::new(&bytes[..], "bytes", 500)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(out[0][0], "ok");
        assert_eq!(out[0][1], "\u{FFFD}\u{FFFD}");
        assert_eq!(out[0][2], "bad");
    }

    #[test]
    fn read_error_yields_once_then_stops() {
        let reader = Broken {
            prefix: Some(b"a b c d e ".to_vec()),
        };
        let mut tokenizer = BatchTokenizer::new(reader, "broken.txt", 3);

        let first = tokenizer.next().unwrap().unwrap();
        assert_eq!(first, vec!["a", "b", "c", "d"]);

        match tokenizer.next() {
            Some(Err(PipelineError::Read { source_name, .. })) => {
                assert_eq!(source_name, "broken.txt")
            }
            other => panic!("expected read error, got {other:?}"),
        }
        assert!(tokenizer.next().is_none());
    }

    #[test]
    fn interrupted_reads_are_retried() {
        let reader = Flaky {
            inner: b"x y z",
            interrupt: false,
        };
        let out: Vec<TokenBatch> = BatchTokenizer::new(reader, "flaky", 500)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(out, vec![vec!["x", "y", "z"]]);
    }

    /// Counts `read` calls on the wrapped slice.
    struct Counting<'a> {
        inner: &'a [u8],
        reads: &'a Cell<usize>,
    }

    impl Read for Counting<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads.set(self.reads.get() + 1);
            self.inner.read(buf)
        }
    }

    fn reads_before_first_batch(input: &str, batch_size: usize) -> (usize, usize) {
        let reads = Cell::new(0);
        let reader = Counting {
            inner: input.as_bytes(),
            reads: &reads,
        };
        let first = BatchTokenizer::new(reader, "counted", batch_size)
            .next()
            .unwrap()
            .unwrap();
        (reads.get(), first.len())
    }

    #[test]
    fn streams_with_carriage_return_separators() {
        let input: String = (0..100_000).map(|i| format!("w{i}\r")).collect();
        assert!(input.len() > READ_CHUNK * 8);

        let (reads, len) = reads_before_first_batch(&input, 500);
        assert_eq!(len, 501);
        assert!(reads <= 2, "read {reads} chunks before the first batch");
    }

    #[test]
    fn streams_with_unicode_separators() {
        for sep in ["\x0B", "\x0C", "\u{3000}", "\u{2003}"] {
            let input: String = (0..100_000).map(|i| format!("w{i}{sep}")).collect();

            let (reads, len) = reads_before_first_batch(&input, 500);
            assert_eq!(len, 501);
            assert!(reads <= 2, "sep={sep:?} read {reads} chunks");
        }
    }

    #[test]
    fn unicode_separator_split_across_reads() {
        let text = "alpha\u{3000}beta\u{2003}gamma\u{00A0}delta";
        let out: Vec<TokenBatch> = BatchTokenizer::new(Trickle(text.as_bytes()), "trickle", 500)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(out, vec![vec!["alpha", "beta", "gamma", "delta"]]);
    }

    #[test]
    fn one_batch_per_step_when_batches_are_small() {
        let input: String = (0..50_000).map(|i| format!("t{i} ")).collect();
        let mut tokenizer = BatchTokenizer::new(input.as_bytes(), "small", 1);

        let first = tokenizer.next().unwrap().unwrap();
        assert_eq!(first, vec!["t0", "t1"]);
        assert!(tokenizer.text.len() <= READ_CHUNK);
        assert_eq!(tokenizer.count(), 49_998);
    }

    #[test]
    fn cut_point_prefers_last_separator() {
        assert_eq!(cut_point(b"a b\rc", 0), Some(4));
        assert_eq!(cut_point(b"abc", 0), None);
        assert_eq!(cut_point("a\u{3000}b".as_bytes(), 2), Some(4));
    }

    #[test]
    fn zero_batch_size_is_clamped() {
        let out = batches("a b", 0);
        assert_eq!(out, vec![vec!["a", "b"]]);
    }

    #[test]
    fn source_name_is_kept() {
        let t = BatchTokenizer::new(&b""[..], "<stdin>", 10);
        assert_eq!(t.source_name(), "<stdin>");
    }
}
