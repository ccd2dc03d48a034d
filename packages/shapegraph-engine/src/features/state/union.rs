//! Ordered heap collection kept per CFG location.

use tracing::debug;

use crate::config::EngineOptions;
use crate::features::compare::are_isomorphic;
use crate::features::join::{join_heaps, JoinStatus};
use crate::features::symheap::SymHeap;
use crate::features::trace::TraceGraph;

/// The set of heaps reaching one program location. Entries are kept in
/// insertion order; all precision policy lives in the two insert flavors.
#[derive(Debug, Default)]
pub struct StateUnion {
    heaps: Vec<SymHeap>,
}

impl StateUnion {
    pub fn new() -> StateUnion {
        StateUnion::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heaps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heaps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SymHeap> {
        self.heaps.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SymHeap> {
        self.heaps.iter()
    }

    /// Index of the first stored heap isomorphic to `sh`.
    pub fn lookup(&self, sh: &SymHeap) -> Option<usize> {
        self.heaps.iter().position(|stored| are_isomorphic(stored, sh))
    }

    /// Exact-precision policy: keep `sh` only if nothing stored already
    /// represents it. Returns whether the union grew.
    pub fn insert_plain(&mut self, sh: SymHeap) -> bool {
        if self.lookup(&sh).is_some() {
            return false;
        }
        self.heaps.push(sh);
        true
    }

    /// Widening policy: try to join `sh` into each stored entry in turn,
    /// appending only when every attempt fails. Returns whether the union
    /// now covers more than before.
    pub fn insert_joined(
        &mut self,
        sh: SymHeap,
        mut trace: Option<&mut TraceGraph>,
        options: &EngineOptions,
    ) -> bool {
        for i in 0..self.heaps.len() {
            let out = match join_heaps(&self.heaps[i], &sh, trace.as_deref_mut(), options) {
                Ok(out) => out,
                Err(_) => continue,
            };
            return match out.status {
                // the stored entry already covers the newcomer
                JoinStatus::UseAny | JoinStatus::UseSh1 => false,
                JoinStatus::UseSh2 => {
                    self.heaps[i] = sh;
                    true
                }
                JoinStatus::ThreeWay => {
                    self.heaps[i] = out.heap;
                    self.compact_from(i, trace, options);
                    true
                }
            };
        }
        self.heaps.push(sh);
        true
    }

    /// After entry `i` was generalized, later entries may have become
    /// redundant; fold every one that now joins into it.
    fn compact_from(
        &mut self,
        i: usize,
        mut trace: Option<&mut TraceGraph>,
        options: &EngineOptions,
    ) {
        let mut folded = 0usize;
        let mut j = i + 1;
        while j < self.heaps.len() {
            let out = match join_heaps(&self.heaps[i], &self.heaps[j], trace.as_deref_mut(), options)
            {
                Ok(out) => out,
                Err(_) => {
                    j += 1;
                    continue;
                }
            };
            let removed = self.heaps.remove(j);
            match out.status {
                JoinStatus::UseAny | JoinStatus::UseSh1 => {}
                JoinStatus::UseSh2 => self.heaps[i] = removed,
                JoinStatus::ThreeWay => self.heaps[i] = out.heap,
            }
            folded += 1;
        }
        if folded > 0 {
            debug!(folded, survivors = self.heaps.len(), "compacted state union");
        }
    }
}
