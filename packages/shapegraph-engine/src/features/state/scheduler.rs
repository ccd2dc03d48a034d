//! Block scheduler for the fixpoint loop.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::config::SchedOrder;
use crate::features::program::BlockId;

/// Todo-set plus queue of CFG blocks with per-block visit counters.
///
/// `schedule` is idempotent while a block is pending; `get_next` pops one
/// pending block and counts the visit. Unlike the join worklist, a block
/// becomes schedulable again as soon as it has been popped.
#[derive(Debug)]
pub struct BlockScheduler {
    order: SchedOrder,
    pending: FxHashSet<BlockId>,
    queue: VecDeque<BlockId>,
    visits: FxHashMap<BlockId, u64>,
}

impl BlockScheduler {
    pub fn new(order: SchedOrder) -> BlockScheduler {
        BlockScheduler {
            order,
            pending: FxHashSet::default(),
            queue: VecDeque::new(),
            visits: FxHashMap::default(),
        }
    }

    /// Enqueue `block` unless it is already waiting. Returns whether the
    /// pending set grew.
    pub fn schedule(&mut self, block: BlockId) -> bool {
        if !self.pending.insert(block) {
            return false;
        }
        self.queue.push_back(block);
        trace!(?block, pending = self.pending.len(), "scheduled block");
        true
    }

    /// Pop the next pending block and count the visit.
    pub fn get_next(&mut self) -> Option<BlockId> {
        let block = match self.order {
            SchedOrder::Dfs => self.queue.pop_back()?,
            SchedOrder::Bfs => self.queue.pop_front()?,
        };
        self.pending.remove(&block);
        *self.visits.entry(block).or_insert(0) += 1;
        Some(block)
    }

    #[inline]
    pub fn is_pending(&self, block: BlockId) -> bool {
        self.pending.contains(&block)
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.queue.iter().copied()
    }

    /// Times `block` has been popped so far.
    pub fn visit_count(&self, block: BlockId) -> u64 {
        self.visits.get(&block).copied().unwrap_or(0)
    }

    /// Total pops across all blocks.
    pub fn total_visits(&self) -> u64 {
        self.visits.values().sum()
    }
}
