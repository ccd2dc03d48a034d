//! Per-block state accumulation for the fixpoint loop.
//!
//! Each CFG block owns a [`StateUnion`] of the heaps that reached it; the
//! [`BlockScheduler`] decides which block to process next; [`StateMap`]
//! binds the two together and applies the loop-edge insertion policy.

mod scheduler;
mod union;

pub use scheduler::BlockScheduler;
pub use union::StateUnion;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::config::EngineOptions;
use crate::features::program::{BlockId, Cfg};
use crate::features::symheap::SymHeap;
use crate::features::trace::TraceGraph;

/// Heaps accumulated at every block, plus the inbound edge that most
/// recently grew each block's union. That edge picks the backtrace when an
/// error is diagnosed while processing the block.
#[derive(Debug, Default)]
pub struct StateMap {
    unions: FxHashMap<BlockId, StateUnion>,
    last_origin: FxHashMap<BlockId, BlockId>,
}

impl StateMap {
    pub fn new() -> StateMap {
        StateMap::default()
    }

    pub fn union(&self, block: BlockId) -> Option<&StateUnion> {
        self.unions.get(&block)
    }

    /// Blocks that have accumulated at least one heap.
    pub fn blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.unions.keys().copied()
    }

    /// Predecessor that last contributed new information to `block`.
    pub fn last_origin(&self, block: BlockId) -> Option<BlockId> {
        self.last_origin.get(&block).copied()
    }

    /// Deliver `heap` to `block` along `from`. Join insertion applies
    /// everywhere unless the options restrict it to loop-closing edges;
    /// then other edges fall back to the exact-precision policy. Returns
    /// whether the block's union changed, i.e. whether the block needs
    /// (re)scheduling.
    pub fn insert(
        &mut self,
        cfg: &Cfg,
        from: Option<BlockId>,
        block: BlockId,
        heap: SymHeap,
        trace: Option<&mut TraceGraph>,
        options: &EngineOptions,
    ) -> bool {
        let join_here = !options.join_on_loop_edges_only
            || from.map(|f| cfg.closes_loop(f, block)).unwrap_or(false);

        let union = self.unions.entry(block).or_default();
        let grew = if join_here {
            union.insert_joined(heap, trace, options)
        } else {
            union.insert_plain(heap)
        };
        if grew {
            if let Some(f) = from {
                self.last_origin.insert(block, f);
            }
            debug!(?block, entries = self.unions[&block].len(), "block state grew");
        }
        grew
    }
}
