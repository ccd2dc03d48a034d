//! Helpers that treat list segments uniformly with plain regions.

use crate::shared::models::ObjId;

use super::domain::ObjKind;
use super::store::SymHeap;

/// How many concrete nodes the object is guaranteed to stand for.
pub fn seg_min_length(sh: &SymHeap, obj: ObjId) -> u32 {
    match sh.obj_kind(obj) {
        ObjKind::Region => 1,
        ObjKind::Opt01 => 0,
        ObjKind::Sls | ObjKind::Dls => sh.obj_min_len(obj),
    }
}

/// Tighten or relax a segment's length bound, clamped at `cap`.
pub fn seg_set_min_length(sh: &mut SymHeap, obj: ObjId, len: u32, cap: u32) {
    match sh.obj_kind(obj) {
        ObjKind::Sls | ObjKind::Dls => sh.set_min_len(obj, len.min(cap)),
        ObjKind::Opt01 => debug_assert!(len == 0, "optional object with a length bound"),
        ObjKind::Region => unreachable!("length bound on concrete {obj}"),
    }
}

/// The DLS end opposite to `obj`; identity for everything else.
pub fn peer_or_self(sh: &SymHeap, obj: ObjId) -> ObjId {
    sh.obj_peer(obj).unwrap_or(obj)
}

/// Value that follows the last summarized node of a segment.
pub fn seg_next_val(sh: &SymHeap, seg: ObjId) -> Option<crate::shared::models::ValId> {
    sh.seg_out_next_val(seg)
}

/// Value that precedes the first summarized node of a DLS.
pub fn seg_prev_val(sh: &SymHeap, seg: ObjId) -> Option<crate::shared::models::ValId> {
    let binding = sh.obj_binding(seg)?;
    if !binding.is_doubly_linked() {
        return None;
    }
    let head_end = if sh.obj_is_dls_head(seg) {
        seg
    } else {
        sh.obj_peer(seg)?
    };
    sh.field_at(head_end, binding.prev).map(|f| f.val)
}

/// Destroy a segment together with its peer end.
pub fn seg_destroy(sh: &mut SymHeap, seg: ObjId) {
    if let Some(peer) = sh.obj_peer(seg) {
        sh.destroy_obj(peer);
    }
    sh.destroy_obj(seg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{BindingOff, TargetSpec, ValId};

    #[test]
    fn min_length_by_kind() {
        let mut sh = SymHeap::new();
        let node = sh.type_intern("node", 16);
        let region = sh.alloc(16, Some(node));
        let opt = sh.alloc(16, Some(node));
        sh.make_opt(opt, None);
        let seg = sh.alloc(16, Some(node));
        sh.make_sls(seg, BindingOff::sls(0, 0), 3);

        assert_eq!(seg_min_length(&sh, region), 1);
        assert_eq!(seg_min_length(&sh, opt), 0);
        assert_eq!(seg_min_length(&sh, seg), 3);

        seg_set_min_length(&mut sh, seg, 100, 64);
        assert_eq!(seg_min_length(&sh, seg), 64);
    }

    #[test]
    fn dls_continuations_read_the_right_end() {
        let mut sh = SymHeap::new();
        let ptr = sh.type_intern("ptr", 8);
        let node = sh.type_intern("node", 16);
        let first = sh.alloc(16, Some(node));
        let last = sh.alloc(16, Some(node));
        sh.make_dls(first, last, BindingOff::dls(0, 0, 8), 2);

        let back = sh.val_unknown(crate::features::symheap::UnknownKind::Unknown);
        let first_addr = sh.val_addr(first, 0, TargetSpec::First);
        let last_addr = sh.val_addr(last, 0, TargetSpec::Last);
        sh.set_field(first, 8, ptr, back); // before the list
        sh.set_field(first, 0, ptr, last_addr); // inner link
        sh.set_field(last, 8, ptr, first_addr); // inner link
        sh.set_field(last, 0, ptr, ValId::NULL); // after the list

        assert_eq!(seg_next_val(&sh, first), Some(ValId::NULL));
        assert_eq!(seg_next_val(&sh, last), Some(ValId::NULL));
        assert_eq!(seg_prev_val(&sh, first), Some(back));
        assert_eq!(seg_prev_val(&sh, last), Some(back));
        assert_eq!(peer_or_self(&sh, first), last);
        assert_eq!(peer_or_self(&sh, last), first);
    }

    #[test]
    fn destroy_takes_both_ends() {
        let mut sh = SymHeap::new();
        let node = sh.type_intern("node", 16);
        let first = sh.alloc(16, Some(node));
        let last = sh.alloc(16, Some(node));
        sh.make_dls(first, last, BindingOff::dls(0, 0, 8), 2);

        seg_destroy(&mut sh, first);
        assert!(!sh.obj_is_valid(first));
        assert!(!sh.obj_is_valid(last));
    }
}
