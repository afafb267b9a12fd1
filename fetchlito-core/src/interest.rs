//! # Interest Tracking
//!
//! Reference counting of readers per key, recomputed from each completed pass.
//!
//! Interest is stored as `(reader, key)` edges: every reader owns the set of keys it read
//! during its most recent completed pass. Committing a new set diffs it against the
//! previous one, and the per-key counts are derived from the edges. A reader that stops
//! reading a key in its next pass therefore stops being counted for it, without any
//! explicit unsubscribe call.
//!
//! ```
//! use fetchlito_core::interest::{InterestTable, ReaderId};
//! use std::collections::BTreeSet;
//!
//! let mut table = InterestTable::new();
//! let reader = ReaderId(1);
//!
//! let diff = table.commit(reader, BTreeSet::from(["/a".to_string(), "/b".to_string()]));
//! assert_eq!(diff.now_observed, vec!["/a".to_string(), "/b".to_string()]);
//!
//! let diff = table.commit(reader, BTreeSet::from(["/b".to_string()]));
//! assert_eq!(diff.now_unobserved, vec!["/a".to_string()]);
//! assert_eq!(table.count("/b"), 1);
//! ```

use std::collections::{BTreeSet, HashMap};

/// Identity of a reader (a render participant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReaderId(pub u64);

/// Keys whose count crossed zero as the result of one commit.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InterestDiff {
    /// Keys that went from 0 to 1 readers.
    pub now_observed: Vec<String>,
    /// Keys that went from 1 to 0 readers.
    pub now_unobserved: Vec<String>,
    /// Every key whose count changed, with its new count.
    pub changed: Vec<(String, usize)>,
}

impl InterestDiff {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }
}

/// The `(reader, key)` join structure with derived per-key counts.
#[derive(Debug, Default)]
pub struct InterestTable {
    by_reader: HashMap<ReaderId, BTreeSet<String>>,
    counts: HashMap<String, usize>,
}

impl InterestTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the reader's interest set with `keys` and returns what changed.
    pub fn commit(&mut self, reader: ReaderId, keys: BTreeSet<String>) -> InterestDiff {
        let previous = self.by_reader.remove(&reader).unwrap_or_default();
        let mut diff = InterestDiff::default();

        for key in previous.difference(&keys) {
            self.decrement(key, &mut diff);
        }
        for key in keys.difference(&previous) {
            self.increment(key, &mut diff);
        }

        if !keys.is_empty() {
            self.by_reader.insert(reader, keys);
        }
        diff
    }

    /// Drops every edge of the reader (reader teardown).
    pub fn release(&mut self, reader: ReaderId) -> InterestDiff {
        let previous = self.by_reader.remove(&reader).unwrap_or_default();
        let mut diff = InterestDiff::default();
        for key in &previous {
            self.decrement(key, &mut diff);
        }
        diff
    }

    /// Number of readers currently interested in `key`.
    pub fn count(&self, key: &str) -> usize {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Keys the reader read in its last committed pass.
    pub fn keys_of(&self, reader: ReaderId) -> Option<&BTreeSet<String>> {
        self.by_reader.get(&reader)
    }

    pub fn reader_count(&self) -> usize {
        self.by_reader.len()
    }

    pub fn clear(&mut self) {
        self.by_reader.clear();
        self.counts.clear();
    }

    fn increment(&mut self, key: &str, diff: &mut InterestDiff) {
        let count = self.counts.entry(key.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            diff.now_observed.push(key.to_string());
        }
        diff.changed.push((key.to_string(), *count));
    }

    fn decrement(&mut self, key: &str, diff: &mut InterestDiff) {
        let Some(count) = self.counts.get_mut(key) else {
            return;
        };
        *count = count.saturating_sub(1);
        let now = *count;
        if now == 0 {
            self.counts.remove(key);
            diff.now_unobserved.push(key.to_string());
        }
        diff.changed.push((key.to_string(), now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(keys: &[&str]) -> BTreeSet<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_commit_counts_each_reader_once() {
        let mut table = InterestTable::new();
        table.commit(ReaderId(1), set(&["/a"]));
        table.commit(ReaderId(2), set(&["/a", "/b"]));

        assert_eq!(table.count("/a"), 2);
        assert_eq!(table.count("/b"), 1);
        assert_eq!(table.reader_count(), 2);
    }

    #[test]
    fn test_recommit_same_set_is_noop() {
        let mut table = InterestTable::new();
        table.commit(ReaderId(1), set(&["/a", "/b"]));
        let diff = table.commit(ReaderId(1), set(&["/a", "/b"]));

        assert!(diff.is_empty());
        assert_eq!(table.count("/a"), 1);
    }

    #[test]
    fn test_dropping_a_key_reports_unobserved() {
        let mut table = InterestTable::new();
        table.commit(ReaderId(1), set(&["/a", "/b"]));
        table.commit(ReaderId(2), set(&["/b"]));

        let diff = table.commit(ReaderId(1), set(&[]));
        assert_eq!(diff.now_unobserved, vec!["/a".to_string()]);
        assert_eq!(table.count("/b"), 1);
        assert!(table.keys_of(ReaderId(1)).is_none());
    }

    #[test]
    fn test_release_reader() {
        let mut table = InterestTable::new();
        table.commit(ReaderId(7), set(&["/a", "/b"]));

        let diff = table.release(ReaderId(7));
        assert_eq!(diff.now_unobserved.len(), 2);
        assert_eq!(table.count("/a"), 0);

        // Releasing twice never goes negative.
        let diff = table.release(ReaderId(7));
        assert!(diff.is_empty());
        assert_eq!(table.count("/a"), 0);
    }

    #[test]
    fn test_clear() {
        let mut table = InterestTable::new();
        table.commit(ReaderId(1), set(&["/a"]));
        table.clear();
        assert_eq!(table.count("/a"), 0);
        assert_eq!(table.reader_count(), 0);
    }
}
