//! Bounded Top-N Selection
//!
//! Keeps the N highest-count entries of a stream in descending order without
//! ever holding more than N of them.
//!
//! ## Insertion
//!
//! Each incoming entry is placed at the first index whose count is strictly
//! smaller than its own, found by binary search. Entries with equal counts
//! therefore keep their arrival order. After the insert the sequence is
//! truncated back to N, dropping the smallest entry.
//!
//! ```text
//! capacity 3:  [9, 5, 5]  + 5  ->  [9, 5, 5]      (rejected, not larger than the minimum)
//!              [9, 5, 5]  + 7  ->  [9, 7, 5]      (inserted at 1, last 5 dropped)
//! ```
//!
//! ## Complexity
//!
//! - Search: O(log N)
//! - Shift: O(N)
//!
//! N is small (around 100) next to the number of distinct trigrams.

use crossbeam_channel::Receiver;
use tristream_types::{PipelineError, TrigramCount};

/// Capacity-limited sequence sorted by descending count.
#[derive(Debug, Clone)]
pub struct TopN {
    capacity: usize,
    entries: Vec<TrigramCount>,
}

impl TopN {
    /// Creates an empty selector holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity.saturating_add(1).min(4096)),
        }
    }

    /// Maximum number of entries kept.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries currently kept.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been kept.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offers one entry.
    ///
    /// Returns `true` if the entry was kept.
    pub fn insert(&mut self, entry: TrigramCount) -> bool {
        let count = entry.count;
        let at = self.entries.partition_point(|e| e.count >= count);
        if at >= self.capacity {
            return false;
        }

        self.entries.insert(at, entry);
        self.entries.truncate(self.capacity);
        true
    }

    /// Current entries, highest count first.
    #[inline]
    pub fn as_slice(&self) -> &[TrigramCount] {
        &self.entries
    }

    /// Consumes the selector, returning its entries highest count first.
    pub fn into_vec(self) -> Vec<TrigramCount> {
        self.entries
    }
}

impl Extend<TrigramCount> for TopN {
    fn extend<I: IntoIterator<Item = TrigramCount>>(&mut self, iter: I) {
        for entry in iter {
            self.insert(entry);
        }
    }
}

/// Drains `counts` into a [`TopN`] of capacity `n`.
///
/// Runs on the calling thread until the stream completes.
///
/// # Errors
/// Returns the first error item received; the remaining stream is dropped.
pub fn select_top(
    n: usize,
    counts: Receiver<Result<TrigramCount, PipelineError>>,
) -> Result<Vec<TrigramCount>, PipelineError> {
    let mut top = TopN::new(n);
    for item in counts {
        top.insert(item?);
    }
    Ok(top.into_vec())
}
