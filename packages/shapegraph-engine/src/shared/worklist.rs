//! Deduplicating work queues.
//!
//! Every graph walk in the engine (comparison, join, prototype collection,
//! garbage collection) is bounded by the same discipline: an item is
//! scheduled at most once per call, and the walk terminates because the
//! never-seen set strictly shrinks. The queue policy decides depth-first
//! versus breadth-first order; the dedup behavior is shared.

use std::collections::VecDeque;
use std::hash::Hash;

use rustc_hash::FxHashSet;

/// Backing queue of a [`WorkList`].
pub trait Queue<T>: Default {
    fn push(&mut self, item: T);
    fn pop(&mut self) -> Option<T>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stack order: the default, depth-first policy.
#[derive(Debug, Clone)]
pub struct Lifo<T> {
    items: Vec<T>,
}

// Manual impl: the derive would demand `T: Default`, which `Queue` must not.
impl<T> Default for Lifo<T> {
    fn default() -> Self {
        Lifo { items: Vec::new() }
    }
}

impl<T> Queue<T> for Lifo<T> {
    fn push(&mut self, item: T) {
        self.items.push(item);
    }

    fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Queue order: breadth-first policy.
#[derive(Debug, Clone)]
pub struct Fifo<T> {
    items: VecDeque<T>,
}

// Manual impl: the derive would demand `T: Default`, which `Queue` must not.
impl<T> Default for Fifo<T> {
    fn default() -> Self {
        Fifo { items: VecDeque::new() }
    }
}

impl<T> Queue<T> for Fifo<T> {
    fn push(&mut self, item: T) {
        self.items.push_back(item);
    }

    fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Work queue that schedules each distinct item at most once.
///
/// "Seen" persists for the lifetime of the worklist, not just while the item
/// is pending; re-scheduling a processed item is a no-op.
#[derive(Debug, Clone)]
pub struct WorkList<T, Q = Lifo<T>>
where
    T: Eq + Hash + Clone,
    Q: Queue<T>,
{
    seen: FxHashSet<T>,
    todo: Q,
}

/// Breadth-first flavor of [`WorkList`].
pub type WorkListFifo<T> = WorkList<T, Fifo<T>>;

impl<T, Q> WorkList<T, Q>
where
    T: Eq + Hash + Clone,
    Q: Queue<T>,
{
    pub fn new() -> Self {
        WorkList {
            seen: FxHashSet::default(),
            todo: Q::default(),
        }
    }

    /// Enqueue `item` unless it was ever scheduled before.
    /// Returns true iff the item was newly added.
    pub fn schedule(&mut self, item: T) -> bool {
        if !self.seen.insert(item.clone()) {
            return false;
        }
        self.todo.push(item);
        true
    }

    /// Pop the next pending item in policy order.
    pub fn next(&mut self) -> Option<T> {
        self.todo.pop()
    }

    #[inline]
    pub fn was_seen(&self, item: &T) -> bool {
        self.seen.contains(item)
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.todo.len()
    }

    #[inline]
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}

impl<T, Q> Default for WorkList<T, Q>
where
    T: Eq + Hash + Clone,
    Q: Queue<T>,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn schedule_deduplicates() {
        let mut wl: WorkList<u32> = WorkList::new();
        assert!(wl.schedule(1));
        assert!(wl.schedule(2));
        assert!(!wl.schedule(1));
        assert_eq!(wl.pending(), 2);

        // seen persists across pops
        assert_eq!(wl.next(), Some(2));
        assert!(!wl.schedule(2));
        assert_eq!(wl.next(), Some(1));
        assert_eq!(wl.next(), None);
    }

    #[test]
    fn lifo_pops_in_stack_order() {
        let mut wl: WorkList<u32> = WorkList::new();
        for i in 0..4 {
            wl.schedule(i);
        }
        assert_eq!(wl.next(), Some(3));
        assert_eq!(wl.next(), Some(2));
    }

    #[test]
    fn fifo_pops_in_queue_order() {
        let mut wl: WorkListFifo<u32> = WorkList::new();
        for i in 0..4 {
            wl.schedule(i);
        }
        assert_eq!(wl.next(), Some(0));
        assert_eq!(wl.next(), Some(1));
    }

    proptest! {
        /// Whatever gets scheduled, each distinct item is popped exactly once.
        #[test]
        fn drains_each_item_once(items in proptest::collection::vec(0u16..64, 0..128)) {
            let mut wl: WorkList<u16> = WorkList::new();
            for &i in &items {
                wl.schedule(i);
            }
            let mut popped = Vec::new();
            while let Some(i) = wl.next() {
                popped.push(i);
            }
            let distinct: std::collections::BTreeSet<_> = items.iter().copied().collect();
            let drained: std::collections::BTreeSet<_> = popped.iter().copied().collect();
            prop_assert_eq!(popped.len(), distinct.len());
            prop_assert_eq!(drained, distinct);
        }
    }
}
