//! Append-only trace graph.
//!
//! Every heap carries the id of the trace node that produced it. The engine
//! only ever appends: a root per entry heap, a clone node per snapshot, and
//! a join node over the two inputs of a three-way join. Consumers walk the
//! parent links to reconstruct how a state came to be.

use serde::{Deserialize, Serialize};

use crate::shared::models::TraceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    Root,
    Clone,
    Join,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceNode {
    pub kind: TraceKind,
    pub parents: Vec<TraceId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceGraph {
    nodes: Vec<TraceNode>,
}

impl TraceGraph {
    pub fn new() -> TraceGraph {
        TraceGraph::default()
    }

    fn push(&mut self, node: TraceNode) -> TraceId {
        let id = TraceId::from_index(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Fresh root with no history.
    pub fn root(&mut self) -> TraceId {
        self.push(TraceNode {
            kind: TraceKind::Root,
            parents: Vec::new(),
        })
    }

    /// Node for a heap cloned from `parent`.
    pub fn clone_of(&mut self, parent: TraceId) -> TraceId {
        self.push(TraceNode {
            kind: TraceKind::Clone,
            parents: vec![parent],
        })
    }

    /// Node for a three-way join merging `a` and `b`.
    pub fn join_of(&mut self, a: TraceId, b: TraceId) -> TraceId {
        self.push(TraceNode {
            kind: TraceKind::Join,
            parents: vec![a, b],
        })
    }

    pub fn node(&self, id: TraceId) -> &TraceNode {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parents_record_history() {
        let mut tg = TraceGraph::new();
        let root = tg.root();
        let left = tg.clone_of(root);
        let right = tg.clone_of(root);
        let joined = tg.join_of(left, right);

        assert_eq!(tg.node(root).kind, TraceKind::Root);
        assert_eq!(tg.node(left).parents, vec![root]);
        assert_eq!(tg.node(joined).kind, TraceKind::Join);
        assert_eq!(tg.node(joined).parents, vec![left, right]);
        assert_eq!(tg.len(), 4);
    }
}
