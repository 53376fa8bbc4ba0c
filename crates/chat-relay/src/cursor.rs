//! Read position over an append-only entry list.
//!
//! The source only ever exposes its full current list of entries. The cursor
//! remembers how many of them were already consumed and hands out the unseen
//! suffix on every retrieval.
//!
//! The list is assumed to grow by appension or to start over from empty after
//! navigation. A list that keeps the same length while its content changes
//! (virtualized rendering evicting old rows) cannot be told apart from an
//! unchanged one, so such sources may miss or repeat entries. That inaccuracy
//! is bounded by the eviction window and is accepted.

use tracing::debug;

/// Tracks the number of entries already processed in the current session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryCursor {
    position: usize,
}

impl EntryCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries already consumed.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Forget the consumed position. The next delta starts from index 0.
    pub fn reset(&mut self) {
        self.position = 0;
    }

    /// Return the entries beyond the consumed position and advance past them.
    ///
    /// A list shorter than the consumed position means the source started a
    /// fresh session; the cursor resets and the whole list is returned.
    pub fn delta<'a, T>(&mut self, current: &'a [T]) -> &'a [T] {
        if current.len() < self.position {
            debug!(
                previous = self.position,
                current = current.len(),
                "Entry list shrank, treating it as a fresh session"
            );
            self.position = 0;
        }

        let start = self.position;
        self.position = current.len();
        &current[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_delta_returns_everything() {
        let mut cursor = EntryCursor::new();
        let entries = ["a", "b", "c"];

        assert_eq!(cursor.delta(&entries), &["a", "b", "c"]);
        assert_eq!(cursor.position(), 3);
    }

    #[test]
    fn test_no_growth_yields_empty_delta() {
        let mut cursor = EntryCursor::new();
        let entries = ["a", "b", "c"];

        cursor.delta(&entries);
        assert!(cursor.delta(&entries).is_empty());
        assert_eq!(cursor.position(), 3);
    }

    #[test]
    fn test_growth_yields_suffix() {
        let mut cursor = EntryCursor::new();
        cursor.delta(&["a", "b"]);

        assert_eq!(cursor.delta(&["a", "b", "c", "d"]), &["c", "d"]);
        assert_eq!(cursor.position(), 4);
    }

    #[test]
    fn test_shrinking_list_resets() {
        let mut cursor = EntryCursor::new();
        cursor.delta(&["a", "b", "c", "d"]);

        assert_eq!(cursor.delta(&["x", "y"]), &["x", "y"]);
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn test_empty_list_after_navigation() {
        let mut cursor = EntryCursor::new();
        cursor.delta(&[1, 2, 3]);

        let empty: [i32; 0] = [];
        assert!(cursor.delta(&empty).is_empty());
        assert_eq!(cursor.position(), 0);
        assert_eq!(cursor.delta(&[7]), &[7]);
    }

    #[test]
    fn test_explicit_reset() {
        let mut cursor = EntryCursor::new();
        cursor.delta(&[1, 2, 3]);
        cursor.reset();

        assert_eq!(cursor.position(), 0);
        assert_eq!(cursor.delta(&[1, 2, 3]), &[1, 2, 3]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Successive deltas over a growing list concatenate to the final list exactly once.
        #[test]
        fn prop_growing_snapshots_yield_each_entry_once(
            growth in prop::collection::vec(0usize..8, 1..30),
        ) {
            let mut cursor = EntryCursor::new();
            let mut source: Vec<usize> = Vec::new();
            let mut seen: Vec<usize> = Vec::new();

            for step in growth {
                for _ in 0..step {
                    source.push(source.len());
                }
                seen.extend_from_slice(cursor.delta(&source));
            }

            prop_assert_eq!(seen, source);
        }

        /// A shorter snapshot always resets the cursor and yields the whole snapshot.
        #[test]
        fn prop_shorter_snapshot_restarts(first in 1usize..50, cut in 0usize..50) {
            let cut = cut % first;
            let mut cursor = EntryCursor::new();
            let long: Vec<usize> = (0..first).collect();
            cursor.delta(&long);

            let short: Vec<usize> = (100..100 + cut).collect();
            prop_assert_eq!(cursor.delta(&short), short.as_slice());
            prop_assert_eq!(cursor.position(), cut);
        }
    }
}
