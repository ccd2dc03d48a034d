//! Interval-keyed multimap from byte windows to field sets.
//!
//! Windows are half-open `[begin, end)`. The map is keyed by `(end, begin)`
//! so an overlap query can start its scan at the first window ending after
//! the query begins and skip everything to the left in one lower-bound
//! lookup; windows beginning past the query end are filtered per entry.

use std::collections::BTreeMap;
use std::hash::Hash;

use rustc_hash::FxHashSet;

/// Half-open byte window `[begin, end)`.
pub type Window = (i64, i64);

#[derive(Debug, Clone, Default)]
pub struct IntervalArena<F>
where
    F: Copy + Eq + Hash,
{
    /// (end, begin) -> handles registered for exactly that window
    map: BTreeMap<(i64, i64), FxHashSet<F>>,
}

impl<F> IntervalArena<F>
where
    F: Copy + Eq + Hash,
{
    pub fn new() -> Self {
        IntervalArena {
            map: BTreeMap::new(),
        }
    }

    /// Register `f` under `win`. Zero-width windows are never stored.
    pub fn add(&mut self, win: Window, f: F) {
        let (begin, end) = win;
        debug_assert!(begin < end, "zero-width window [{begin}, {end})");
        self.map.entry((end, begin)).or_default().insert(f);
    }

    /// Remove exactly `f`'s overlap with `win`.
    ///
    /// Where a prior registration of `f` sticks out of `win`, the leftover
    /// sub-windows are re-registered, so the remaining coverage of `f` is
    /// its old coverage minus `win`.
    pub fn sub(&mut self, win: Window, f: F) {
        let (begin, end) = win;
        debug_assert!(begin < end, "zero-width window [{begin}, {end})");

        let hits: Vec<(i64, i64)> = self
            .map
            .range((begin + 1, i64::MIN)..)
            .filter(|(&(_, b), set)| b < end && set.contains(&f))
            .map(|(&key, _)| key)
            .collect();

        for (e, b) in hits {
            if let Some(set) = self.map.get_mut(&(e, b)) {
                set.remove(&f);
                if set.is_empty() {
                    self.map.remove(&(e, b));
                }
            }
            if b < begin {
                self.add((b, begin), f);
            }
            if end < e {
                self.add((end, e), f);
            }
        }
    }

    /// All handles whose registered windows overlap `win`.
    pub fn intersects(&self, win: Window) -> FxHashSet<F> {
        let (begin, end) = win;
        debug_assert!(begin < end, "zero-width window [{begin}, {end})");

        let mut dst = FxHashSet::default();
        for (&(_, b), set) in self.map.range((begin + 1, i64::MIN)..) {
            if b < end {
                dst.extend(set.iter().copied());
            }
        }
        dst
    }

    /// Handles registered under exactly `win` (no partial overlaps).
    pub fn exact_match(&self, win: Window) -> FxHashSet<F> {
        let (begin, end) = win;
        self.map
            .get(&(end, begin))
            .cloned()
            .unwrap_or_default()
    }

    /// All windows currently carrying `f`, in `(begin, end)` order.
    ///
    /// Brute-force scan over the whole arena; meant for diagnostics and
    /// repair passes, not hot paths.
    pub fn reverse_lookup(&self, f: F) -> Vec<Window> {
        let mut wins: Vec<Window> = self
            .map
            .iter()
            .filter(|(_, set)| set.contains(&f))
            .map(|(&(e, b), _)| (b, e))
            .collect();
        wins.sort_unstable();
        wins
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Count of distinct registered windows.
    #[inline]
    pub fn window_count(&self) -> usize {
        self.map.len()
    }
}
