//! Word trigram extraction and counting.
//!
//! Provides the sliding 3-token window over a batch and the single-owner
//! aggregation map the pipeline's counting stage is built on.

use rustc_hash::FxHashMap;
use tristream_types::TrigramCount;

/// Calls `callback` with every overlapping 3-token window of `tokens`.
///
/// For fewer than 3 tokens nothing is emitted.
/// For N tokens, exactly N-2 windows are emitted, left to right.
///
/// # Example
///
/// ```
/// use tristream_core::analyzer::trigram::for_each_trigram;
///
/// let tokens = ["a", "b", "c", "d"].map(String::from);
/// let mut keys = Vec::new();
/// for_each_trigram(&tokens, |a, b, c| keys.push(format!("{a} {b} {c}")));
///
/// assert_eq!(keys, ["a b c", "b c d"]);
/// ```
#[inline(always)]
pub fn for_each_trigram<F>(tokens: &[String], mut callback: F)
where
    F: FnMut(&str, &str, &str),
{
    for window in tokens.windows(3) {
        callback(&window[0], &window[1], &window[2]);
    }
}

/// Number of windows [`for_each_trigram`] emits for `len` tokens.
#[inline(always)]
pub const fn count_trigrams(len: usize) -> usize {
    len.saturating_sub(2)
}

/// Writes the key for `(a, b, c)` into `out`, replacing its contents.
///
/// Words are joined by a single space.
#[inline]
pub fn write_key(out: &mut String, a: &str, b: &str, c: &str) {
    out.clear();
    out.reserve(a.len() + b.len() + c.len() + 2);
    out.push_str(a);
    out.push(' ');
    out.push_str(b);
    out.push(' ');
    out.push_str(c);
}

/// Aggregation map from trigram key to running count.
///
/// Owned by exactly one counting stage; it is never shared between threads
/// while counting.
#[derive(Debug, Default)]
pub struct TrigramCounter {
    counts: FxHashMap<String, u64>,
    /// Scratch buffer reused for every key lookup.
    key: String,
    batches: u64,
}

impl TrigramCounter {
    /// Creates an empty counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts every window of one batch.
    ///
    /// Callers must feed batches that overlap by two tokens per source so that
    /// windows spanning a batch cut are seen exactly once.
    pub fn observe_batch(&mut self, tokens: &[String]) {
        self.batches += 1;

        let Self { counts, key, .. } = self;
        for_each_trigram(tokens, |a, b, c| {
            write_key(key, a, b, c);
            match counts.get_mut(key.as_str()) {
                Some(count) => *count += 1,
                None => {
                    counts.insert(key.clone(), 1);
                }
            }
        });
    }

    /// Current count for `key`, if it has been seen.
    pub fn get(&self, key: &str) -> Option<u64> {
        self.counts.get(key).copied()
    }

    /// Number of distinct trigrams seen.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Returns `true` if no trigram has been seen.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Number of batches observed.
    pub fn batches(&self) -> u64 {
        self.batches
    }

    /// Consumes the counter, yielding every entry in unspecified order.
    pub fn into_counts(self) -> impl Iterator<Item = TrigramCount> {
        self.counts
            .into_iter()
            .map(|(key, count)| TrigramCount { key, count })
    }
}
