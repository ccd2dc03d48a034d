//! Symmetric relation stores over unordered id pairs.
//!
//! Pairs are normalized to `(min, max)` on entry, so `(a, b)` and `(b, a)`
//! address the same slot. The disequality store of the heap and the
//! uniformity cache of chain discovery both sit on these.

use std::hash::Hash;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

#[inline]
fn sort_pair<K: Ord>(a: K, b: K) -> (K, K) {
    if b < a {
        (b, a)
    } else {
        (a, b)
    }
}

/// Set of unordered pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairSet<K>
where
    K: Ord + Hash + Copy,
{
    pairs: FxHashSet<(K, K)>,
}

// Manual impl: the derive would demand `K: Default`, which ids don't have.
impl<K> Default for PairSet<K>
where
    K: Ord + Hash + Copy,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> PairSet<K>
where
    K: Ord + Hash + Copy,
{
    pub fn new() -> Self {
        PairSet {
            pairs: FxHashSet::default(),
        }
    }

    /// Insert the unordered pair; true iff it was not present.
    pub fn add(&mut self, a: K, b: K) -> bool {
        debug_assert!(a != b, "reflexive pair makes no sense here");
        self.pairs.insert(sort_pair(a, b))
    }

    /// Remove the unordered pair; true iff it was present.
    pub fn remove(&mut self, a: K, b: K) -> bool {
        self.pairs.remove(&sort_pair(a, b))
    }

    #[inline]
    pub fn contains(&self, a: K, b: K) -> bool {
        self.pairs.contains(&sort_pair(a, b))
    }

    /// All pairs, each reported once in `(min, max)` order.
    pub fn iter(&self) -> impl Iterator<Item = (K, K)> + '_ {
        self.pairs.iter().copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Map keyed by unordered pairs.
#[derive(Debug, Clone, Default)]
pub struct PairMap<K, V>
where
    K: Ord + Hash + Copy,
{
    entries: FxHashMap<(K, K), V>,
}

impl<K, V> PairMap<K, V>
where
    K: Ord + Hash + Copy,
{
    pub fn new() -> Self {
        PairMap {
            entries: FxHashMap::default(),
        }
    }

    pub fn insert(&mut self, a: K, b: K, value: V) -> Option<V> {
        self.entries.insert(sort_pair(a, b), value)
    }

    pub fn get(&self, a: K, b: K) -> Option<&V> {
        self.entries.get(&sort_pair(a, b))
    }

    #[inline]
    pub fn contains(&self, a: K, b: K) -> bool {
        self.entries.contains_key(&sort_pair(a, b))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_set_is_symmetric() {
        let mut set = PairSet::new();
        assert!(set.add(3u32, 1));
        assert!(!set.add(1, 3));
        assert!(set.contains(1, 3));
        assert!(set.contains(3, 1));
        assert_eq!(set.len(), 1);

        assert!(set.remove(3, 1));
        assert!(set.is_empty());
    }

    #[test]
    fn pair_set_iterates_normalized() {
        let mut set = PairSet::new();
        set.add(9u32, 2);
        let pairs: Vec<_> = set.iter().collect();
        assert_eq!(pairs, vec![(2, 9)]);
    }

    #[test]
    fn pair_map_is_symmetric() {
        let mut map = PairMap::new();
        assert_eq!(map.insert(5u32, 2, "x"), None);
        assert_eq!(map.insert(2, 5, "y"), Some("x"));
        assert_eq!(map.get(5, 2), Some(&"y"));
        assert!(map.contains(2, 5));
    }
}
