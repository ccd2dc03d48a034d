//! Program representation: a control-flow graph of opaque basic blocks.
//!
//! The engine never looks inside a block; instructions belong to the
//! frontend. The scheduler only needs block handles, edges, and the
//! loop-closing classification that decides where join insertion applies.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{depth_first_search, DfsEvent};
use petgraph::Direction;
use rustc_hash::FxHashSet;

/// Opaque block handle.
pub type BlockId = NodeIndex;

/// Per-block bookkeeping carried by the graph.
#[derive(Debug, Clone, Default)]
pub struct BlockInfo {
    /// Label for logs and diagnostics.
    pub name: String,
}

/// Directed control-flow graph. The first block added becomes the entry
/// unless one is set explicitly.
#[derive(Debug, Default)]
pub struct Cfg {
    graph: DiGraph<BlockInfo, ()>,
    entry: Option<BlockId>,
    /// Loop-closing edges from the entry, kept current across edits.
    back_edges: FxHashSet<(BlockId, BlockId)>,
}

impl Cfg {
    pub fn new() -> Cfg {
        Cfg::default()
    }

    pub fn add_block(&mut self, name: impl Into<String>) -> BlockId {
        let id = self.graph.add_node(BlockInfo { name: name.into() });
        if self.entry.is_none() {
            self.entry = Some(id);
        }
        id
    }

    /// Add or keep the edge `from -> to`; parallel edges are never stored.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.graph.update_edge(from, to, ());
        self.reclassify();
    }

    pub fn set_entry(&mut self, block: BlockId) {
        self.entry = Some(block);
        self.reclassify();
    }

    #[inline]
    pub fn entry(&self) -> Option<BlockId> {
        self.entry
    }

    #[inline]
    pub fn block_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.graph.node_indices()
    }

    pub fn name(&self, block: BlockId) -> &str {
        &self.graph[block].name
    }

    pub fn succs(&self, block: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.graph.neighbors_directed(block, Direction::Outgoing)
    }

    pub fn preds(&self, block: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.graph.neighbors_directed(block, Direction::Incoming)
    }

    /// True when `from -> to` closes a loop in the walk from the entry.
    pub fn closes_loop(&self, from: BlockId, to: BlockId) -> bool {
        self.back_edges.contains(&(from, to))
    }

    fn reclassify(&mut self) {
        self.back_edges.clear();
        let Some(entry) = self.entry else {
            return;
        };
        let back = &mut self.back_edges;
        depth_first_search(&self.graph, Some(entry), |event| {
            if let DfsEvent::BackEdge(u, v) = event {
                back.insert((u, v));
            }
        });
    }
}
