//! Reachability-based collection of unreferenced heap objects.

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::shared::models::ObjId;
use crate::shared::WorkList;

use super::store::SymHeap;

/// Destroy every object unreachable from program variables and the return
/// placeholder. Returns the destroyed ids, in arena order.
pub fn collect_junk(sh: &mut SymHeap) -> Vec<ObjId> {
    let mut wl: WorkList<ObjId> = WorkList::default();
    for (_, obj) in sh.program_vars() {
        wl.schedule(obj);
    }
    if let Some(ret) = sh.ret_obj() {
        wl.schedule(ret);
    }

    let mut reachable: FxHashSet<ObjId> = FxHashSet::default();
    while let Some(obj) = wl.next() {
        reachable.insert(obj);
        if let Some(peer) = sh.obj_peer(obj) {
            wl.schedule(peer);
        }
        for (_, _, target) in sh.live_ptr_fields(obj) {
            wl.schedule(target);
        }
        for block in sh.uni_blocks(obj).values() {
            if let Some(target) = sh.val_any_target(block.tpl) {
                wl.schedule(target);
            }
        }
    }

    let junk: Vec<ObjId> = sh
        .live_objects()
        .filter(|obj| !reachable.contains(obj))
        .collect();
    for &obj in &junk {
        sh.destroy_obj(obj);
    }
    if !junk.is_empty() {
        debug!(count = junk.len(), "collected unreachable objects");
    }
    junk
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{BindingOff, TargetSpec, ValId, VarId};

    #[test]
    fn keeps_what_variables_reach() {
        let mut sh = SymHeap::new();
        let ptr = sh.type_intern("ptr", 8);
        let node = sh.type_intern("node", 16);

        let var = sh.var_create(VarId(1), 8, Some(ptr));
        let kept = sh.alloc(16, Some(node));
        let lost = sh.alloc(16, Some(node));
        let kept_addr = sh.val_addr(kept, 0, TargetSpec::Region);
        sh.set_field(var, 0, ptr, kept_addr);

        let junk = collect_junk(&mut sh);
        assert_eq!(junk, vec![lost]);
        assert!(sh.obj_is_valid(kept));
        assert!(!sh.obj_is_valid(lost));
    }

    #[test]
    fn peer_end_counts_as_reachable() {
        let mut sh = SymHeap::new();
        let ptr = sh.type_intern("ptr", 8);
        let node = sh.type_intern("node", 16);

        let var = sh.var_create(VarId(1), 8, Some(ptr));
        let first = sh.alloc(16, Some(node));
        let last = sh.alloc(16, Some(node));
        sh.make_dls(first, last, BindingOff::dls(0, 0, 8), 2);
        let head = sh.val_addr(first, 0, TargetSpec::First);
        sh.set_field(var, 0, ptr, head);
        sh.set_field(last, 0, ptr, ValId::NULL);

        let junk = collect_junk(&mut sh);
        assert!(junk.is_empty());
        assert!(sh.obj_is_valid(first) && sh.obj_is_valid(last));
    }

    #[test]
    fn cycles_do_not_keep_themselves_alive() {
        let mut sh = SymHeap::new();
        let ptr = sh.type_intern("ptr", 8);
        let node = sh.type_intern("node", 16);

        let a = sh.alloc(16, Some(node));
        let b = sh.alloc(16, Some(node));
        let va = sh.val_addr(a, 0, TargetSpec::Region);
        let vb = sh.val_addr(b, 0, TargetSpec::Region);
        sh.set_field(a, 0, ptr, vb);
        sh.set_field(b, 0, ptr, va);

        let junk = collect_junk(&mut sh);
        assert_eq!(junk.len(), 2);
    }
}
