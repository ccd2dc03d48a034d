//! Per-call state of one join: translation maps, pair cache, worklist.

use rustc_hash::FxHashMap;

use crate::config::EngineOptions;
use crate::features::symheap::SymHeap;
use crate::shared::models::{FldRef, ObjId, ValId};
use crate::shared::WorkList;

use super::{JoinStats, JoinStatus, ProtoPair};

/// One pending destination field together with its source fields. A missing
/// side means the value is cloned one-sidedly instead of joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct JoinItem {
    pub dst: FldRef,
    pub f1: Option<FldRef>,
    pub f2: Option<FldRef>,
    /// Expected nesting-level drift between the sides (level2 - level1).
    pub ldiff: i32,
    /// Summarization owners crossed on the way to this item.
    pub bump: u32,
}

/// Per-side value translation kept for the disequality pass. A source or
/// destination id that translates two different ways is tombstoned.
#[derive(Debug, Default)]
struct SideVals {
    fwd: FxHashMap<ValId, Option<ValId>>,
    rev: FxHashMap<ValId, Option<ValId>>,
}

impl SideVals {
    fn note(&mut self, src: ValId, dst: ValId) {
        match self.fwd.get_mut(&src) {
            Some(slot) => {
                if *slot != Some(dst) {
                    *slot = None;
                }
            }
            None => {
                self.fwd.insert(src, Some(dst));
            }
        }
        match self.rev.get_mut(&dst) {
            Some(slot) => {
                if *slot != Some(src) {
                    *slot = None;
                }
            }
            None => {
                self.rev.insert(dst, Some(src));
            }
        }
    }

    fn to_dst(&self, src: ValId) -> Option<ValId> {
        if src.is_special() {
            Some(src)
        } else {
            self.fwd.get(&src).copied().flatten()
        }
    }

    fn to_src(&self, dst: ValId) -> Option<ValId> {
        if dst.is_special() {
            Some(dst)
        } else {
            self.rev.get(&dst).copied().flatten()
        }
    }

    fn apply_merges(&mut self, merges: &FxHashMap<ValId, ValId>) {
        for slot in self.fwd.values_mut() {
            if let Some(v) = *slot {
                if let Some(&canonical) = merges.get(&v) {
                    *slot = Some(canonical);
                }
            }
        }
        for (&old, &new) in merges {
            if let Some(entry) = self.rev.remove(&old) {
                match self.rev.get_mut(&new) {
                    Some(slot) => {
                        if *slot != entry {
                            *slot = None;
                        }
                    }
                    None => {
                        self.rev.insert(new, entry);
                    }
                }
            }
        }
    }
}

pub(crate) struct JoinCtx<'a> {
    pub dst: &'a mut SymHeap,
    pub sh1: &'a SymHeap,
    pub sh2: &'a SymHeap,
    pub options: &'a EngineOptions,
    /// Destination writes land in the same heap the sources live in.
    pub self_join: bool,

    pub wl: WorkList<JoinItem>,
    pub status: JoinStatus,
    pub stats: JoinStats,
    pub protos: Vec<ProtoPair>,

    obj_map1: FxHashMap<ObjId, ObjId>,
    obj_map2: FxHashMap<ObjId, ObjId>,
    obj_src1: FxHashMap<ObjId, ObjId>,
    obj_src2: FxHashMap<ObjId, ObjId>,
    /// Destinations folded away by repair, resolved when items pop.
    dst_redirects: FxHashMap<ObjId, ObjId>,

    val_cache: FxHashMap<(ValId, ValId), ValId>,
    side1: SideVals,
    side2: SideVals,
}

impl<'a> JoinCtx<'a> {
    pub fn new(
        dst: &'a mut SymHeap,
        sh1: &'a SymHeap,
        sh2: &'a SymHeap,
        options: &'a EngineOptions,
        self_join: bool,
    ) -> JoinCtx<'a> {
        JoinCtx {
            dst,
            sh1,
            sh2,
            options,
            self_join,
            wl: WorkList::default(),
            status: JoinStatus::UseAny,
            stats: JoinStats::default(),
            protos: Vec::new(),
            obj_map1: FxHashMap::default(),
            obj_map2: FxHashMap::default(),
            obj_src1: FxHashMap::default(),
            obj_src2: FxHashMap::default(),
            dst_redirects: FxHashMap::default(),
            val_cache: FxHashMap::default(),
            side1: SideVals::default(),
            side2: SideVals::default(),
        }
    }

    #[inline]
    pub fn escalate(&mut self, s: JoinStatus) {
        self.status.escalate(s);
    }

    #[inline]
    pub fn escalate_cover(&mut self, eq1: bool, eq2: bool) {
        self.status.escalate_cover(eq1, eq2);
    }

    /// Follow repair redirects to the surviving destination.
    pub fn resolve_dst(&self, mut obj: ObjId) -> ObjId {
        while let Some(&next) = self.dst_redirects.get(&obj) {
            obj = next;
        }
        obj
    }

    pub fn map_pair(&mut self, src1: Option<ObjId>, src2: Option<ObjId>, dst: ObjId) {
        if let Some(o1) = src1 {
            self.obj_map1.insert(o1, dst);
            self.obj_src1.insert(dst, o1);
        }
        if let Some(o2) = src2 {
            self.obj_map2.insert(o2, dst);
            self.obj_src2.insert(dst, o2);
        }
    }

    pub fn dst_of1(&self, o1: ObjId) -> Option<ObjId> {
        self.obj_map1.get(&o1).map(|&d| self.resolve_dst(d))
    }

    pub fn dst_of2(&self, o2: ObjId) -> Option<ObjId> {
        self.obj_map2.get(&o2).map(|&d| self.resolve_dst(d))
    }

    pub fn src1_of(&self, dst: ObjId) -> Option<ObjId> {
        self.obj_src1.get(&dst).copied()
    }

    pub fn src2_of(&self, dst: ObjId) -> Option<ObjId> {
        self.obj_src2.get(&dst).copied()
    }

    /// Detach a ghost destination so a fresh two-sided one can take over.
    pub fn unmap_dst(&mut self, ghost: ObjId) {
        if let Some(o1) = self.obj_src1.remove(&ghost) {
            self.obj_map1.remove(&o1);
        }
        if let Some(o2) = self.obj_src2.remove(&ghost) {
            self.obj_map2.remove(&o2);
        }
    }

    /// Record that `stale` was folded into `keep` and rewrite the object
    /// maps accordingly.
    pub fn note_redirect(&mut self, stale: ObjId, keep: ObjId) {
        self.dst_redirects.insert(stale, keep);
        for slot in self.obj_map1.values_mut() {
            if *slot == stale {
                *slot = keep;
            }
        }
        for slot in self.obj_map2.values_mut() {
            if *slot == stale {
                *slot = keep;
            }
        }
        if let Some(o1) = self.obj_src1.remove(&stale) {
            self.obj_src1.entry(keep).or_insert(o1);
        }
        if let Some(o2) = self.obj_src2.remove(&stale) {
            self.obj_src2.entry(keep).or_insert(o2);
        }
    }

    /// Rewrite cached values after a store-level redirect merged ids.
    pub fn apply_value_merges(&mut self, merges: &FxHashMap<ValId, ValId>) {
        if merges.is_empty() {
            return;
        }
        for slot in self.val_cache.values_mut() {
            if let Some(&canonical) = merges.get(slot) {
                *slot = canonical;
            }
        }
        self.side1.apply_merges(merges);
        self.side2.apply_merges(merges);
    }

    pub fn cache_get(&mut self, v1: ValId, v2: ValId) -> Option<ValId> {
        if !self.options.join_pair_cache {
            return None;
        }
        let hit = self.val_cache.get(&(v1, v2)).copied();
        if hit.is_some() {
            self.stats.cache_hits += 1;
        }
        hit
    }

    /// The cache always records, even when lookups are disabled; the
    /// per-side notes feed the disequality pass.
    pub fn cache_put(&mut self, v1: ValId, v2: ValId, dst: ValId) {
        self.val_cache.insert((v1, v2), dst);
        if !v1.is_invalid() && !v1.is_special() && !dst.is_special() {
            self.side1.note(v1, dst);
        }
        if !v2.is_invalid() && !v2.is_special() && !dst.is_special() {
            self.side2.note(v2, dst);
        }
    }

    pub fn val1_to_dst(&self, v1: ValId) -> Option<ValId> {
        self.side1.to_dst(v1)
    }

    pub fn val2_to_dst(&self, v2: ValId) -> Option<ValId> {
        self.side2.to_dst(v2)
    }

    pub fn dst_to_val1(&self, dst: ValId) -> Option<ValId> {
        self.side1.to_src(dst)
    }

    pub fn dst_to_val2(&self, dst: ValId) -> Option<ValId> {
        self.side2.to_src(dst)
    }

    pub fn schedule(&mut self, item: JoinItem) {
        self.wl.schedule(item);
    }

    /// Track a destination object living at a non-zero nesting level.
    pub fn note_proto(&mut self, dst: ObjId, src1: Option<ObjId>, src2: Option<ObjId>) {
        self.protos.push(ProtoPair { dst, src1, src2 });
    }
}
