//! The join algorithm: worklist drain, value dispatch, object-level merge,
//! segment insertion, chain summarization, and the may-exist fallback.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::config::{EngineOptions, MayExistHeuristic};
use crate::features::compare::{
    are_isomorphic, match_sub_heaps, types_exact, types_match, SubHeapVisitor, Visit,
};
use crate::features::intervals::{IntRange, INT_MAX, INT_MIN};
use crate::features::prototype::proto_check_consistency;
use crate::features::symheap::{
    collect_junk, seg_min_length, seg_next_val, seg_prev_val, CustomValue, ObjKind, SymHeap,
    UniBlock, UnknownKind,
};
use crate::features::trace::TraceGraph;
use crate::shared::models::{BindingOff, FldRef, ObjId, TargetSpec, TypeId, ValId, VarId};

use super::context::{JoinCtx, JoinItem};
use super::discover::{chain_with_binding, discover_chain, ChainInfo};
use super::repair::rejoin_objects;
use super::{JoinError, JoinStats, JoinStatus, ProtoPair};

/// Result of a cross-heap join.
#[derive(Debug)]
pub struct JoinOutcome {
    pub heap: SymHeap,
    pub status: JoinStatus,
    pub stats: JoinStats,
}

/// Result of a self-joined data merge.
#[derive(Debug)]
pub struct DataJoin {
    pub status: JoinStatus,
    pub protos: Vec<ProtoPair>,
    pub stats: JoinStats,
}

/// Which input heap a one-sided operation reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    One,
    Two,
}

/// Join two heaps that reconverge at one program location.
///
/// The result covers both inputs; `status` reports whether it is equivalent
/// to one of them or a genuine generalization. Failure means the heaps are
/// too different to merge and should be kept apart.
pub fn join_heaps(
    sh1: &SymHeap,
    sh2: &SymHeap,
    trace: Option<&mut TraceGraph>,
    options: &EngineOptions,
) -> Result<JoinOutcome, JoinError> {
    let res = join_heaps_inner(sh1, sh2, trace, options);
    if options.self_check {
        match &res {
            Err(err) => {
                if are_isomorphic(sh1, sh2) {
                    warn!(%err, "join failed on heaps that compare equal");
                }
            }
            Ok(out) => {
                if !proto_check_consistency(&out.heap) {
                    warn!("joined heap failed the nesting consistency check");
                }
                if out.status == JoinStatus::ThreeWay
                    && (are_isomorphic(&out.heap, sh1) || are_isomorphic(&out.heap, sh2))
                {
                    warn!("three-way join produced a heap equal to one input");
                }
            }
        }
    }
    res
}

fn join_heaps_inner(
    sh1: &SymHeap,
    sh2: &SymHeap,
    trace: Option<&mut TraceGraph>,
    options: &EngineOptions,
) -> Result<JoinOutcome, JoinError> {
    let vars1: Vec<(VarId, ObjId)> = sh1.program_vars().collect();
    let vars2: Vec<(VarId, ObjId)> = sh2.program_vars().collect();
    if vars1.len() != vars2.len() {
        return Err(JoinError::VarMismatch);
    }

    let mut dst = SymHeap::new();
    let mut ctx = JoinCtx::new(&mut dst, sh1, sh2, options, false);

    for (&(var1, o1), &(var2, o2)) in vars1.iter().zip(vars2.iter()) {
        if var1 != var2 {
            return Err(JoinError::VarMismatch);
        }
        join_values(&mut ctx, root_addr(sh1, o1), root_addr(sh2, o2), 0, 0)?;
    }
    match (sh1.ret_obj(), sh2.ret_obj()) {
        (Some(r1), Some(r2)) => {
            join_values(&mut ctx, root_addr(sh1, r1), root_addr(sh2, r2), 0, 0)?;
        }
        (None, None) => {}
        _ => return Err(JoinError::VarMismatch),
    }

    drain(&mut ctx)?;
    reconcile_neq(&mut ctx);
    apply_proto_min_policy(&mut ctx);

    let status = ctx.status;
    let stats = ctx.stats;
    if status == JoinStatus::ThreeWay && !options.allow_three_way_join {
        return Err(JoinError::ThreeWayDisabled);
    }
    let ret_dst = sh1.ret_obj().and_then(|r| ctx.dst_of1(r));

    if let Some(r) = ret_dst {
        dst.set_ret_obj(r);
    }
    collect_junk(&mut dst);
    assert_no_placeholders(&dst);
    if let Some(tg) = trace {
        attach_trace(&mut dst, sh1, sh2, status, tg);
    }
    debug!(
        %status,
        pairs = stats.pairs_joined,
        created = stats.objects_created,
        "joined heaps"
    );
    Ok(JoinOutcome { heap: dst, status, stats })
}

/// Merge the data of `obj1` and `obj2` into `dst_obj` inside one heap.
///
/// The destination's own binding links are left to the caller; everything
/// else is merged pairwise in place, with values shared by both sources
/// copied through unchanged. Reports which destination objects became
/// prototypes.
pub fn join_data(
    sh: &mut SymHeap,
    dst_obj: ObjId,
    obj1: ObjId,
    obj2: ObjId,
    options: &EngineOptions,
) -> Result<DataJoin, JoinError> {
    let skip = sh.obj_binding(dst_obj);
    let snapshot = sh.clone();
    let mut ctx = JoinCtx::new(sh, &snapshot, &snapshot, options, true);
    ctx.map_pair(Some(obj1), Some(obj2), dst_obj);

    let mut offs: BTreeSet<i64> = BTreeSet::new();
    offs.extend(snapshot.live_fields(obj1).map(|(off, _)| off));
    offs.extend(snapshot.live_fields(obj2).map(|(off, _)| off));
    for off in offs {
        if let Some(b) = skip {
            if off == b.next || off == b.prev {
                continue;
            }
        }
        match (snapshot.field_at(obj1, off), snapshot.field_at(obj2, off)) {
            (Some(f1), Some(f2)) => {
                if !types_match(&snapshot, Some(f1.ty), &snapshot, Some(f2.ty)) {
                    return Err(JoinError::ObjMismatch { o1: obj1, o2: obj2 });
                }
                let dst = ctx.dst.set_field(dst_obj, off, f1.ty, ValId::INVALID);
                ctx.schedule(JoinItem {
                    dst,
                    f1: Some(FldRef::new(obj1, off)),
                    f2: Some(FldRef::new(obj2, off)),
                    ldiff: 0,
                    bump: 0,
                });
            }
            (Some(f1), None) => {
                let u = ctx.dst.val_unknown(UnknownKind::Uninitialized);
                ctx.dst.set_field(dst_obj, off, f1.ty, u);
                ctx.escalate_cover(false, true);
            }
            (None, Some(f2)) => {
                let u = ctx.dst.val_unknown(UnknownKind::Uninitialized);
                ctx.dst.set_field(dst_obj, off, f2.ty, u);
                ctx.escalate_cover(true, false);
            }
            (None, None) => unreachable!("offset without a field on either side"),
        }
    }

    drain(&mut ctx)?;
    if ctx.status == JoinStatus::ThreeWay && !options.allow_three_way_join {
        return Err(JoinError::ThreeWayDisabled);
    }
    Ok(DataJoin {
        status: ctx.status,
        protos: std::mem::take(&mut ctx.protos),
        stats: ctx.stats,
    })
}

// ═══════════════════════════════════════════════════════════════
// Worklist drain
// ═══════════════════════════════════════════════════════════════

fn drain(ctx: &mut JoinCtx<'_>) -> Result<(), JoinError> {
    while let Some(item) = ctx.wl.next() {
        let dst = FldRef::new(ctx.resolve_dst(item.dst.obj), item.dst.off);
        let out = match (item.f1, item.f2) {
            (Some(f1), Some(f2)) => {
                let a = ctx.sh1.field_value(f1);
                let b = ctx.sh2.field_value(f2);
                join_values(ctx, a, b, item.ldiff, item.bump)?
            }
            (Some(f1), None) => {
                let a = ctx.sh1.field_value(f1);
                clone_value(ctx, Side::One, a, item.bump)
            }
            (None, Some(f2)) => {
                let b = ctx.sh2.field_value(f2);
                clone_value(ctx, Side::Two, b, item.bump)
            }
            (None, None) => unreachable!("join item without sources"),
        };
        ctx.dst.set_field_value(dst, out);
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
// Value dispatch
// ═══════════════════════════════════════════════════════════════

fn join_values(
    ctx: &mut JoinCtx<'_>,
    v1: ValId,
    v2: ValId,
    ldiff: i32,
    bump: u32,
) -> Result<ValId, JoinError> {
    ctx.stats.pairs_joined += 1;
    if v1.is_invalid() || v2.is_invalid() {
        unreachable!("invalid value reached the join");
    }
    // literal constants and values shared by both self-join sources copy
    // through unchanged
    if v1 == v2 && (ctx.self_join || v1.is_special()) {
        return Ok(v1);
    }
    if let Some(out) = ctx.cache_get(v1, v2) {
        return Ok(out);
    }
    let out = join_values_core(ctx, v1, v2, ldiff, bump)?;
    ctx.cache_put(v1, v2, out);
    Ok(out)
}

fn join_values_core(
    ctx: &mut JoinCtx<'_>,
    v1: ValId,
    v2: ValId,
    ldiff: i32,
    bump: u32,
) -> Result<ValId, JoinError> {
    // two distinct literal constants only meet as plain uncertainty
    if v1.is_special() && v2.is_special() {
        ctx.escalate(JoinStatus::ThreeWay);
        return Ok(ctx.dst.val_unknown(UnknownKind::Unknown));
    }

    let k1 = ctx.sh1.val_unknown_kind(v1);
    let k2 = ctx.sh2.val_unknown_kind(v2);
    if k1.is_some() || k2.is_some() {
        // a live pointer never folds into an unknown
        if (k1.is_none() && ctx.sh1.val_any_target(v1).is_some())
            || (k2.is_none() && ctx.sh2.val_any_target(v2).is_some())
        {
            return Err(JoinError::Incompatible { v1, v2 });
        }
        let merged = match (k1, k2) {
            (Some(a), Some(b)) if a == b => a,
            _ => UnknownKind::Unknown,
        };
        ctx.escalate_cover(k1 == Some(merged), k2 == Some(merged));
        return Ok(ctx.dst.val_unknown(merged));
    }

    if ctx.sh1.val_custom_ref(v1).is_some() || ctx.sh2.val_custom_ref(v2).is_some() {
        return join_customs(ctx, v1, v2);
    }

    let t1 = ptr_view(ctx.sh1, v1);
    let t2 = ptr_view(ctx.sh2, v2);
    match (t1, t2) {
        (Some(t1), Some(t2)) => join_targets(ctx, v1, t1, v2, t2, ldiff, bump),
        (Some(t), None) if v2.is_null() => null_vs_target(ctx, Side::One, v1, t, v2, ldiff, bump),
        (None, Some(t)) if v1.is_null() => null_vs_target(ctx, Side::Two, v2, t, v1, ldiff, bump),
        (Some(_), None) | (None, Some(_)) => Err(JoinError::Incompatible { v1, v2 }),
        (None, None) => unreachable!("unclassified value pair {v1} / {v2}"),
    }
}

fn join_customs(ctx: &mut JoinCtx<'_>, v1: ValId, v2: ValId) -> Result<ValId, JoinError> {
    let (Some(c1), Some(c2)) = (ctx.sh1.val_custom_ref(v1), ctx.sh2.val_custom_ref(v2)) else {
        // a payload against null, truth, or a pointer has no common shape
        return Err(JoinError::Incompatible { v1, v2 });
    };
    if c1 == c2 {
        let c = c1.clone();
        return Ok(ctx.dst.val_custom(c));
    }
    if let (Some(r1), Some(r2)) = (c1.as_range(), c2.as_range()) {
        let hull = join_ranges(r1, r2, ctx.options.int_arithmetic_limit);
        ctx.escalate_cover(hull == r1, hull == r2);
        return Ok(ctx.dst.val_custom(CustomValue::Range(hull)));
    }
    ctx.escalate(JoinStatus::ThreeWay);
    Ok(ctx.dst.val_unknown(UnknownKind::Unknown))
}

/// Hull of two ranges, widened to the unbounded sentinels once both sides
/// are themselves uncertain and the hull keeps growing past the configured
/// bound.
fn join_ranges(r1: IntRange, r2: IntRange, limit: i64) -> IntRange {
    let hull = IntRange::join(r1, r2);
    if r1.is_singular() || r2.is_singular() || hull == r1 || hull == r2 {
        return hull;
    }
    let bounded =
        hull.lo != INT_MIN && hull.hi != INT_MAX && hull.width() <= limit.max(0) as u64;
    if bounded {
        return hull;
    }
    IntRange::new(
        if r1.lo == r2.lo { hull.lo } else { INT_MIN },
        if r1.hi == r2.hi { hull.hi } else { INT_MAX },
    )
}

// ═══════════════════════════════════════════════════════════════
// Pointer pairs
// ═══════════════════════════════════════════════════════════════

fn join_targets(
    ctx: &mut JoinCtx<'_>,
    v1: ValId,
    t1: (ObjId, IntRange, TargetSpec),
    v2: ValId,
    t2: (ObjId, IntRange, TargetSpec),
    ldiff: i32,
    bump: u32,
) -> Result<ValId, JoinError> {
    let (o1, r1, sp1) = t1;
    let (o2, r2, sp2) = t2;

    match (ctx.dst_of1(o1), ctx.dst_of2(o2)) {
        (Some(d1), Some(d2)) if d1 == d2 => {
            return Ok(derive_addr(ctx, d1, r1, sp1, r2, sp2));
        }
        (Some(d1), Some(d2)) => {
            // both sides committed to different destinations earlier
            rejoin_objects(ctx, d2, d1)?;
            let d = ctx.resolve_dst(d1);
            return Ok(derive_addr(ctx, d, r1, sp1, r2, sp2));
        }
        (Some(ghost), None) | (None, Some(ghost)) => {
            // a one-sided clone ran ahead; rebuild the pair and fold the
            // ghost into the fresh two-sided destination
            ctx.unmap_dst(ghost);
            let d = join_objects(ctx, o1, o2, ldiff, bump)?;
            rejoin_objects(ctx, ghost, d)?;
            let d = ctx.resolve_dst(d);
            return Ok(derive_addr(ctx, d, r1, sp1, r2, sp2));
        }
        (None, None) => {}
    }

    let identity = v1 == v2 && o1 == o2 && r1 == r2 && sp1 == sp2;
    if !identity
        && r1.is_singular()
        && r2.is_singular()
        && r1.lo == r2.lo
        && sp1 == TargetSpec::Region
        && sp2 == TargetSpec::Region
        && ctx.sh1.obj_kind(o1) == ObjKind::Region
        && ctx.sh2.obj_kind(o2) == ObjKind::Region
    {
        if let Some(out) = try_summarize(ctx, o1, o2, r1.lo, ldiff, bump)? {
            return Ok(out);
        }
    }

    if let Some(out) = try_insertion(ctx, Side::One, o1, r1, v2, ldiff, bump)? {
        return Ok(out);
    }
    if let Some(out) = try_insertion(ctx, Side::Two, o2, r2, v1, ldiff, bump)? {
        return Ok(out);
    }

    match join_objects(ctx, o1, o2, ldiff, bump) {
        Ok(d) => Ok(derive_addr(ctx, d, r1, sp1, r2, sp2)),
        Err(err) => {
            if let Some(out) = may_exist(ctx, Side::One, o1, r1, sp1, v2, ldiff, bump)? {
                return Ok(out);
            }
            if let Some(out) = may_exist(ctx, Side::Two, o2, r2, sp2, v1, ldiff, bump)? {
                return Ok(out);
            }
            Err(err)
        }
    }
}

fn null_vs_target(
    ctx: &mut JoinCtx<'_>,
    side: Side,
    v_ptr: ValId,
    target: (ObjId, IntRange, TargetSpec),
    other: ValId,
    ldiff: i32,
    bump: u32,
) -> Result<ValId, JoinError> {
    let (o, r, sp) = target;
    if let Some(d) = mapped_dst(ctx, side, o) {
        // the object joined concretely elsewhere; absence on the other
        // side only reconciles if the image can stand for zero nodes
        let kind = ctx.dst.obj_kind(d);
        if kind.is_abstract() {
            if kind != ObjKind::Opt01 {
                ctx.dst.set_min_len(d, 0);
            }
            ctx.escalate(JoinStatus::ThreeWay);
            let spec = ctx.dst.default_spec(d);
            let out = if r.is_singular() {
                ctx.dst.val_addr(d, r.lo, spec)
            } else {
                ctx.dst.val_range_addr(d, r, spec)
            };
            return Ok(out);
        }
        let (v1, v2) = orient(side, v_ptr, other);
        return Err(JoinError::Incompatible { v1, v2 });
    }
    if let Some(out) = try_insertion(ctx, side, o, r, other, ldiff, bump)? {
        return Ok(out);
    }
    if let Some(out) = may_exist(ctx, side, o, r, sp, other, ldiff, bump)? {
        return Ok(out);
    }
    let (v1, v2) = orient(side, v_ptr, other);
    Err(JoinError::Incompatible { v1, v2 })
}

/// Address of `d` joined from both sides' offsets and end specifiers.
fn derive_addr(
    ctx: &mut JoinCtx<'_>,
    d: ObjId,
    r1: IntRange,
    sp1: TargetSpec,
    r2: IntRange,
    sp2: TargetSpec,
) -> ValId {
    let hull = join_ranges(r1, r2, ctx.options.int_arithmetic_limit);
    ctx.escalate_cover(hull == r1, hull == r2);
    let spec = if sp1 == sp2 && sp1 == TargetSpec::All {
        TargetSpec::All
    } else {
        ctx.dst.default_spec(d)
    };
    if hull.is_singular() {
        ctx.dst.val_addr(d, hull.lo, spec)
    } else {
        ctx.dst.val_range_addr(d, hull, spec)
    }
}

// ═══════════════════════════════════════════════════════════════
// Object-level join
// ═══════════════════════════════════════════════════════════════

fn join_objects(
    ctx: &mut JoinCtx<'_>,
    o1: ObjId,
    o2: ObjId,
    ldiff: i32,
    bump: u32,
) -> Result<ObjId, JoinError> {
    let sh1 = ctx.sh1;
    let sh2 = ctx.sh2;
    let mismatch = JoinError::ObjMismatch { o1, o2 };

    let valid1 = sh1.obj_is_valid(o1);
    let valid2 = sh2.obj_is_valid(o2);
    if valid1 != valid2 {
        return Err(mismatch);
    }
    if !valid1 {
        // both dangling: a dead placeholder keeps the addresses expressible
        let d = ctx.dst.alloc(sh1.obj_size(o1), None);
        ctx.dst.destroy_obj(d);
        ctx.map_pair(Some(o1), Some(o2), d);
        ctx.stats.objects_created += 1;
        return Ok(d);
    }
    if sh1.obj_size(o1) != sh2.obj_size(o2) || sh1.obj_var(o1) != sh2.obj_var(o2) {
        return Err(mismatch);
    }

    let k1 = sh1.obj_kind(o1);
    let k2 = sh2.obj_kind(o2);
    let dominant = k1.max(k2);
    let binding = match (sh1.obj_binding(o1), sh2.obj_binding(o2)) {
        (Some(a), Some(b)) if a != b => return Err(mismatch),
        (a, b) => a.or(b),
    };
    if dominant == ObjKind::Dls
        && (k1 != k2 || sh1.obj_is_dls_head(o1) != sh2.obj_is_dls_head(o2))
    {
        return Err(mismatch);
    }

    let l1 = sh1.obj_proto_level(o1);
    let l2 = sh2.obj_proto_level(o2);
    if l2 as i32 - l1 as i32 != ldiff && !(l1 == 0 && l2 == 0) {
        return Err(JoinError::LevelMismatch { o1, o2 });
    }
    let dst_level = l1.max(l2) + bump;

    let min1 = seg_min_length(sh1, o1);
    let min2 = seg_min_length(sh2, o2);
    let min_dst = min1.min(min2).min(ctx.options.max_seg_min_len);

    let child_ldiff = if dominant.is_abstract() {
        match (k1 == ObjKind::Region, k2 == ObjKind::Region) {
            (true, false) => ldiff + 1,
            (false, true) => ldiff - 1,
            _ => ldiff,
        }
    } else {
        ldiff
    };

    let size = sh1.obj_size(o1);
    // mismatched static types do not block the join; the destination loses
    // its type instead
    let ty = if types_exact(sh1, sh1.obj_type(o1), sh2, sh2.obj_type(o2)) {
        copy_type(ctx.dst, sh1, sh1.obj_type(o1))
    } else {
        ctx.escalate(JoinStatus::ThreeWay);
        None
    };
    let d = match sh1.obj_var(o1) {
        Some(v) => ctx.dst.var_create(v, size, ty),
        None => ctx.dst.alloc(size, ty),
    };
    ctx.map_pair(Some(o1), Some(o2), d);
    ctx.stats.objects_created += 1;

    if dominant == ObjKind::Dls {
        let p1 = dls_peer(sh1, o1);
        let p2 = dls_peer(sh2, o2);
        if sh1.obj_size(p1) != sh2.obj_size(p2) {
            return Err(mismatch);
        }
        let pty = if types_exact(sh1, sh1.obj_type(p1), sh2, sh2.obj_type(p2)) {
            copy_type(ctx.dst, sh1, sh1.obj_type(p1))
        } else {
            ctx.escalate(JoinStatus::ThreeWay);
            None
        };
        let dp = ctx.dst.alloc(sh1.obj_size(p1), pty);
        ctx.map_pair(Some(p1), Some(p2), dp);
        ctx.stats.objects_created += 1;

        let bind = match binding {
            Some(b) => b,
            None => unreachable!("doubly-linked segment {o1} without a binding"),
        };
        let (first, last) = if sh1.obj_is_dls_head(o1) { (d, dp) } else { (dp, d) };
        ctx.dst.make_dls(first, last, bind, min_dst);
        ctx.dst.set_proto_level(d, dst_level);

        join_fields(ctx, d, o1, o2, child_ldiff, bump, &[])?;
        join_uni_blocks(ctx, d, o1, o2);
        join_fields(ctx, dp, p1, p2, child_ldiff, bump, &[])?;
        join_uni_blocks(ctx, dp, p1, p2);
        if ctx.self_join || dst_level > 0 {
            ctx.note_proto(d, Some(o1), Some(o2));
            ctx.note_proto(dp, Some(p1), Some(p2));
        }
    } else {
        match dominant {
            ObjKind::Region => {}
            ObjKind::Opt01 => ctx.dst.make_opt(d, binding),
            ObjKind::Sls => {
                let bind = match binding {
                    Some(b) => b,
                    None => unreachable!("segment {o1} without a binding"),
                };
                ctx.dst.make_sls(d, bind, min_dst);
            }
            ObjKind::Dls => unreachable!(),
        }
        ctx.dst.set_proto_level(d, dst_level);
        join_fields(ctx, d, o1, o2, child_ldiff, bump, &[])?;
        join_uni_blocks(ctx, d, o1, o2);
        if ctx.self_join || dst_level > 0 {
            ctx.note_proto(d, Some(o1), Some(o2));
        }
    }

    let eq1 = dominant == k1 && (!dominant.is_abstract() || min_dst == min1);
    let eq2 = dominant == k2 && (!dominant.is_abstract() || min_dst == min2);
    ctx.escalate_cover(eq1, eq2);
    Ok(d)
}

/// Union field walk: shared offsets become pending pairs, one-sided offsets
/// degrade to an uninitialized unknown on the destination.
fn join_fields(
    ctx: &mut JoinCtx<'_>,
    d: ObjId,
    o1: ObjId,
    o2: ObjId,
    ldiff: i32,
    bump: u32,
    skip: &[i64],
) -> Result<(), JoinError> {
    let sh1 = ctx.sh1;
    let sh2 = ctx.sh2;
    let mut offs: BTreeSet<i64> = BTreeSet::new();
    offs.extend(sh1.live_fields(o1).map(|(off, _)| off));
    offs.extend(sh2.live_fields(o2).map(|(off, _)| off));

    for off in offs {
        if skip.contains(&off) {
            continue;
        }
        match (sh1.field_at(o1, off), sh2.field_at(o2, off)) {
            (Some(f1), Some(f2)) => {
                if !types_match(sh1, Some(f1.ty), sh2, Some(f2.ty)) {
                    return Err(JoinError::ObjMismatch { o1, o2 });
                }
                let ty = copy_row(ctx.dst, sh1, f1.ty);
                let dst = ctx.dst.set_field(d, off, ty, ValId::INVALID);
                ctx.schedule(JoinItem {
                    dst,
                    f1: Some(FldRef::new(o1, off)),
                    f2: Some(FldRef::new(o2, off)),
                    ldiff,
                    bump,
                });
            }
            (Some(f1), None) => {
                let ty = copy_row(ctx.dst, sh1, f1.ty);
                let u = ctx.dst.val_unknown(UnknownKind::Uninitialized);
                ctx.dst.set_field(d, off, ty, u);
                ctx.escalate_cover(false, true);
            }
            (None, Some(f2)) => {
                let ty = copy_row(ctx.dst, sh2, f2.ty);
                let u = ctx.dst.val_unknown(UnknownKind::Uninitialized);
                ctx.dst.set_field(d, off, ty, u);
                ctx.escalate_cover(true, false);
            }
            (None, None) => unreachable!("offset without a field on either side"),
        }
    }
    Ok(())
}

/// Keep uniform windows present with equal bounds on both sides and a
/// template of the same class; every dropped window escalates toward the
/// side that never had it.
fn join_uni_blocks(ctx: &mut JoinCtx<'_>, d: ObjId, o1: ObjId, o2: ObjId) {
    use crate::features::intervals::IntervalArena;

    let sh1 = ctx.sh1;
    let sh2 = ctx.sh2;
    if sh1.uni_blocks(o1).is_empty() && sh2.uni_blocks(o2).is_empty() {
        return;
    }

    let mut arena: IntervalArena<(u8, i64)> = IntervalArena::new();
    for (&off, b) in sh1.uni_blocks(o1) {
        arena.add(b.window(), (1, off));
    }
    for (&off, b) in sh2.uni_blocks(o2) {
        arena.add(b.window(), (2, off));
    }

    for (&off, b1) in sh1.uni_blocks(o1) {
        let twin = arena
            .exact_match(b1.window())
            .into_iter()
            .find(|&(side, _)| side == 2);
        let Some((_, off2)) = twin else {
            ctx.escalate_cover(false, true);
            continue;
        };
        let b2 = sh2.uni_blocks(o2)[&off2];
        let tpl = if b1.tpl.is_null() && b2.tpl.is_null() {
            Some(ValId::NULL)
        } else {
            match (sh1.val_unknown_kind(b1.tpl), sh2.val_unknown_kind(b2.tpl)) {
                (Some(ka), Some(kb)) if ka == kb => Some(ctx.dst.val_unknown(ka)),
                _ => None,
            }
        };
        match tpl {
            Some(tpl) => ctx.dst.write_uni_block(d, UniBlock { off, size: b1.size, tpl }),
            None => ctx.escalate_cover(false, false),
        }
    }
    for (_, b2) in sh2.uni_blocks(o2) {
        let lone = !arena
            .exact_match(b2.window())
            .into_iter()
            .any(|(side, _)| side == 1);
        if lone {
            ctx.escalate_cover(true, false);
        }
    }
}

// ═══════════════════════════════════════════════════════════════
// One-sided clones
// ═══════════════════════════════════════════════════════════════

fn clone_value(ctx: &mut JoinCtx<'_>, side: Side, v: ValId, bump: u32) -> ValId {
    if v.is_invalid() {
        unreachable!("invalid value in a source heap");
    }
    if v.is_special() {
        return v;
    }
    let (c1, c2) = match side {
        Side::One => (v, ValId::INVALID),
        Side::Two => (ValId::INVALID, v),
    };
    if let Some(out) = ctx.cache_get(c1, c2) {
        return out;
    }
    let sh = side_heap(ctx, side);
    let out = if let Some(k) = sh.val_unknown_kind(v) {
        ctx.dst.val_unknown(k)
    } else if let Some(c) = sh.val_custom_ref(v) {
        let c = c.clone();
        ctx.dst.val_custom(c)
    } else if let Some((o, off, sp)) = sh.val_target(v) {
        let d = clone_object(ctx, side, o, None, bump);
        ctx.dst.val_addr(d, off, sp)
    } else if let Some((o, off, sp)) = sh.val_range_target(v) {
        let d = clone_object(ctx, side, o, None, bump);
        ctx.dst.val_range_addr(d, off, sp)
    } else {
        unreachable!("value {v} has no core")
    };
    ctx.cache_put(c1, c2, out);
    out
}

/// Deep one-sided copy of an object into the destination heap. Fields are
/// scheduled as one-sided items; `skip` leaves one source field for the
/// caller to wire up.
fn clone_object(
    ctx: &mut JoinCtx<'_>,
    side: Side,
    o: ObjId,
    skip: Option<(ObjId, i64)>,
    bump: u32,
) -> ObjId {
    if let Some(d) = mapped_dst(ctx, side, o) {
        return d;
    }
    let sh = side_heap(ctx, side);
    let ty = copy_type(ctx.dst, sh, sh.obj_type(o));
    let size = sh.obj_size(o);

    if !sh.obj_is_valid(o) {
        let d = ctx.dst.alloc(size, ty);
        ctx.dst.destroy_obj(d);
        map_side(ctx, side, o, d);
        ctx.stats.objects_created += 1;
        return d;
    }
    debug_assert!(sh.obj_var(o).is_none(), "cloning a variable root {o}");

    let d = ctx.dst.alloc(size, ty);
    map_side(ctx, side, o, d);
    ctx.stats.objects_created += 1;
    let level = sh.obj_proto_level(o) + bump;

    match sh.obj_kind(o) {
        ObjKind::Region => {}
        ObjKind::Opt01 => ctx.dst.make_opt(d, sh.obj_binding(o)),
        ObjKind::Sls => {
            let bind = match sh.obj_binding(o) {
                Some(b) => b,
                None => unreachable!("segment {o} without a binding"),
            };
            ctx.dst.make_sls(d, bind, sh.obj_min_len(o));
        }
        ObjKind::Dls => {
            let p = dls_peer(sh, o);
            let pty = copy_type(ctx.dst, sh, sh.obj_type(p));
            let dp = ctx.dst.alloc(sh.obj_size(p), pty);
            map_side(ctx, side, p, dp);
            ctx.stats.objects_created += 1;
            let bind = match sh.obj_binding(o) {
                Some(b) => b,
                None => unreachable!("segment {o} without a binding"),
            };
            let (first, last) = if sh.obj_is_dls_head(o) { (d, dp) } else { (dp, d) };
            ctx.dst.make_dls(first, last, bind, sh.obj_min_len(o));
            clone_members(ctx, side, p, dp, skip, bump);
            if ctx.self_join || level > 0 {
                note_clone(ctx, side, p, dp);
            }
        }
    }
    ctx.dst.set_proto_level(d, level);
    clone_members(ctx, side, o, d, skip, bump);
    if ctx.self_join || level > 0 {
        note_clone(ctx, side, o, d);
    }
    d
}

fn clone_members(
    ctx: &mut JoinCtx<'_>,
    side: Side,
    o: ObjId,
    d: ObjId,
    skip: Option<(ObjId, i64)>,
    bump: u32,
) {
    let sh = side_heap(ctx, side);
    for (off, fld) in sh.live_fields(o) {
        if skip == Some((o, off)) {
            continue;
        }
        let ty = copy_row(ctx.dst, sh, fld.ty);
        let dst = ctx.dst.set_field(d, off, ty, ValId::INVALID);
        let (f1, f2) = match side {
            Side::One => (Some(FldRef::new(o, off)), None),
            Side::Two => (None, Some(FldRef::new(o, off))),
        };
        ctx.schedule(JoinItem { dst, f1, f2, ldiff: 0, bump });
    }
    for b in sh.uni_blocks(o).values() {
        let tpl = if b.tpl.is_null() {
            ValId::NULL
        } else {
            match sh.val_unknown_kind(b.tpl) {
                Some(k) => ctx.dst.val_unknown(k),
                None => unreachable!("uniform template must be null or unknown"),
            }
        };
        ctx.dst.write_uni_block(d, UniBlock { off: b.off, size: b.size, tpl });
    }
}

fn note_clone(ctx: &mut JoinCtx<'_>, side: Side, src: ObjId, d: ObjId) {
    match side {
        Side::One => ctx.note_proto(d, Some(src), None),
        Side::Two => ctx.note_proto(d, None, Some(src)),
    }
}

// ═══════════════════════════════════════════════════════════════
// Segment insertion
// ═══════════════════════════════════════════════════════════════

/// One side enters an abstract segment the other side never materialized.
/// A read-only lookahead decides whether the other side's value matches
/// what follows the segment; if so, the segment is cloned at minimum
/// length zero and the continuation joined two-sidedly.
fn try_insertion(
    ctx: &mut JoinCtx<'_>,
    side: Side,
    seg: ObjId,
    off: IntRange,
    other: ValId,
    ldiff: i32,
    bump: u32,
) -> Result<Option<ValId>, JoinError> {
    let sh = side_heap(ctx, side);
    if !sh.obj_is_valid(seg)
        || !sh.obj_kind(seg).is_abstract()
        || mapped_dst(ctx, side, seg).is_some()
    {
        return Ok(None);
    }
    let Some(binding) = sh.obj_binding(seg) else {
        return Ok(None);
    };
    if !off.is_singular() || off.lo != binding.head {
        return Ok(None);
    }

    // the traversal direction follows the end the pointer names
    let backwards = sh.obj_kind(seg) == ObjKind::Dls && !sh.obj_is_dls_head(seg);
    let cont = if backwards {
        seg_prev_val(sh, seg)
    } else {
        seg_next_val(sh, seg)
    };
    let Some(cont) = cont else {
        return Ok(None);
    };
    let seeds = match side {
        Side::One => [(cont, other)],
        Side::Two => [(other, cont)],
    };
    if match_sub_heaps(ctx.sh1, ctx.sh2, &seeds, &mut SegSkipProbe::new()).is_none() {
        return Ok(None);
    }

    let (carrier_src, cont_off) = match (sh.obj_kind(seg), backwards) {
        (ObjKind::Dls, true) => (dls_peer(sh, seg), binding.prev),
        (ObjKind::Dls, false) if sh.obj_is_dls_head(seg) => (dls_peer(sh, seg), binding.next),
        _ => (seg, binding.next),
    };
    let min_src = seg_min_length(sh, seg);

    let d_entry = clone_object(ctx, side, seg, Some((carrier_src, cont_off)), bump);
    ctx.dst.set_min_len(d_entry, 0);
    let d_carrier = match mapped_dst(ctx, side, carrier_src) {
        Some(d) => d,
        None => unreachable!("clone of {carrier_src} left no image"),
    };
    let cont_dst = match side {
        Side::One => join_values(ctx, cont, other, ldiff, bump)?,
        Side::Two => join_values(ctx, other, cont, ldiff, bump)?,
    };
    let ty = copy_field_ty(ctx.dst, sh, carrier_src, cont_off);
    ctx.dst.set_field(d_carrier, cont_off, ty, cont_dst);

    match side {
        Side::One => ctx.escalate_cover(min_src == 0, false),
        Side::Two => ctx.escalate_cover(false, min_src == 0),
    }
    ctx.stats.segments_inserted += 1;
    debug!(%seg, ?side, "inserted segment clone at length zero");

    let spec = ctx.dst.default_spec(d_entry);
    Ok(Some(ctx.dst.val_addr(d_entry, binding.head, spec)))
}

// ═══════════════════════════════════════════════════════════════
// Chain summarization
// ═══════════════════════════════════════════════════════════════

fn try_summarize(
    ctx: &mut JoinCtx<'_>,
    o1: ObjId,
    o2: ObjId,
    off: i64,
    ldiff: i32,
    bump: u32,
) -> Result<Option<ValId>, JoinError> {
    if ctx.options.disable_sls && ctx.options.disable_dls {
        return Ok(None);
    }
    let sh1 = ctx.sh1;
    let sh2 = ctx.sh2;
    let l1 = sh1.obj_proto_level(o1);
    let l2 = sh2.obj_proto_level(o2);
    if l2 as i32 - l1 as i32 != ldiff && !(l1 == 0 && l2 == 0) {
        return Ok(None);
    }

    let threshold = (ctx.options.chain_threshold as usize).max(2);
    let viable = |c: &ChainInfo, other: &[ObjId]| {
        let a = c.nodes.len();
        let b = other.len();
        a.max(b) >= threshold && a.min(b) >= 1 && (!c.dls || a.min(b) >= 2)
    };

    let mut chosen: Option<(BindingOff, bool, Vec<ObjId>, Vec<ObjId>)> = None;
    if let Some(c1) = discover_chain(sh1, o1, off, ctx.options) {
        let n2 = chain_with_binding(sh2, o2, off, c1.binding, c1.dls);
        if viable(&c1, &n2) {
            chosen = Some((c1.binding, c1.dls, c1.nodes, n2));
        }
    }
    if chosen.is_none() {
        if let Some(c2) = discover_chain(sh2, o2, off, ctx.options) {
            let n1 = chain_with_binding(sh1, o1, off, c2.binding, c2.dls);
            if viable(&c2, &n1) {
                chosen = Some((c2.binding, c2.dls, n1, c2.nodes));
            }
        }
    }
    let Some((binding, dls, nodes1, nodes2)) = chosen else {
        return Ok(None);
    };
    let out = summarize_chains(ctx, binding, dls, &nodes1, &nodes2, ldiff, bump)?;
    Ok(Some(out))
}

/// Collapse two matched concrete runs into one fresh segment. Node data
/// joins one nesting level deeper; the continuation joins the values past
/// both runs.
fn summarize_chains(
    ctx: &mut JoinCtx<'_>,
    binding: BindingOff,
    dls: bool,
    nodes1: &[ObjId],
    nodes2: &[ObjId],
    ldiff: i32,
    bump: u32,
) -> Result<ValId, JoinError> {
    let sh1 = ctx.sh1;
    let sh2 = ctx.sh2;
    let head1 = nodes1[0];
    let head2 = nodes2[0];
    let last1 = nodes1[nodes1.len() - 1];
    let last2 = nodes2[nodes2.len() - 1];

    let min = (nodes1.len().min(nodes2.len()) as u32).min(ctx.options.max_seg_min_len);
    let size = sh1.obj_size(head1);
    let ty = copy_type(ctx.dst, sh1, sh1.obj_type(head1));
    let dst_level = sh1.obj_proto_level(head1).max(sh2.obj_proto_level(head2)) + bump;

    let d_entry = if dls {
        let d_first = ctx.dst.alloc(size, ty);
        let d_last = ctx.dst.alloc(size, ty);
        ctx.stats.objects_created += 2;
        ctx.dst.make_dls(d_first, d_last, binding, min);
        ctx.dst.set_proto_level(d_first, dst_level);
        ctx.map_pair(Some(head1), Some(head2), d_first);
        ctx.map_pair(Some(last1), Some(last2), d_last);

        // inner links close the pair; the outward links join below
        let next_ty = copy_field_ty(ctx.dst, sh1, head1, binding.next);
        let addr_last = ctx.dst.val_addr(d_last, binding.head, TargetSpec::Last);
        ctx.dst.set_field(d_first, binding.next, next_ty, addr_last);
        let prev_ty = copy_field_ty(ctx.dst, sh1, last1, binding.prev);
        let addr_first = ctx.dst.val_addr(d_first, binding.head, TargetSpec::First);
        ctx.dst.set_field(d_last, binding.prev, prev_ty, addr_first);

        join_fields(ctx, d_first, head1, head2, ldiff, bump + 1, &[binding.next, binding.prev])?;
        join_uni_blocks(ctx, d_first, head1, head2);
        join_fields(ctx, d_last, last1, last2, ldiff, bump + 1, &[binding.next, binding.prev])?;
        join_uni_blocks(ctx, d_last, last1, last2);

        schedule_link(ctx, d_first, binding.prev, head1, head2, ldiff, bump)?;
        schedule_link(ctx, d_last, binding.next, last1, last2, ldiff, bump)?;

        if ctx.self_join || dst_level > 0 {
            ctx.note_proto(d_first, Some(head1), Some(head2));
            ctx.note_proto(d_last, Some(last1), Some(last2));
        }
        d_first
    } else {
        let d = ctx.dst.alloc(size, ty);
        ctx.stats.objects_created += 1;
        ctx.dst.make_sls(d, binding, min);
        ctx.dst.set_proto_level(d, dst_level);
        ctx.map_pair(Some(head1), Some(head2), d);

        join_fields(ctx, d, head1, head2, ldiff, bump + 1, &[binding.next])?;
        join_uni_blocks(ctx, d, head1, head2);
        schedule_link(ctx, d, binding.next, last1, last2, ldiff, bump)?;

        if ctx.self_join || dst_level > 0 {
            ctx.note_proto(d, Some(head1), Some(head2));
        }
        d
    };

    ctx.escalate(JoinStatus::ThreeWay);
    ctx.stats.segments_summarized += 1;
    debug!(
        len1 = nodes1.len(),
        len2 = nodes2.len(),
        min,
        dls,
        "summarized concrete chains"
    );
    Ok(ctx.dst.val_addr(d_entry, binding.head, TargetSpec::First))
}

/// Schedule one outward link of a fresh segment, degrading gracefully when
/// a side never wrote it.
fn schedule_link(
    ctx: &mut JoinCtx<'_>,
    d: ObjId,
    off: i64,
    s1: ObjId,
    s2: ObjId,
    ldiff: i32,
    bump: u32,
) -> Result<(), JoinError> {
    let sh1 = ctx.sh1;
    let sh2 = ctx.sh2;
    match (sh1.field_at(s1, off), sh2.field_at(s2, off)) {
        (Some(f1), Some(f2)) => {
            if !types_match(sh1, Some(f1.ty), sh2, Some(f2.ty)) {
                return Err(JoinError::ObjMismatch { o1: s1, o2: s2 });
            }
            let ty = copy_row(ctx.dst, sh1, f1.ty);
            let dst = ctx.dst.set_field(d, off, ty, ValId::INVALID);
            ctx.schedule(JoinItem {
                dst,
                f1: Some(FldRef::new(s1, off)),
                f2: Some(FldRef::new(s2, off)),
                ldiff,
                bump,
            });
        }
        (Some(f1), None) => {
            let ty = copy_row(ctx.dst, sh1, f1.ty);
            let u = ctx.dst.val_unknown(UnknownKind::Uninitialized);
            ctx.dst.set_field(d, off, ty, u);
            ctx.escalate_cover(false, true);
        }
        (None, Some(f2)) => {
            let ty = copy_row(ctx.dst, sh2, f2.ty);
            let u = ctx.dst.val_unknown(UnknownKind::Uninitialized);
            ctx.dst.set_field(d, off, ty, u);
            ctx.escalate_cover(true, false);
        }
        (None, None) => {}
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
// May-exist fallback
// ═══════════════════════════════════════════════════════════════

/// Wrap one side's concrete node as an optional when the other side's value
/// matches something reachable behind it. Candidates follow possibly-empty
/// segments a bounded number of hops; the heuristic picks among the fields
/// whose probe succeeded.
fn may_exist(
    ctx: &mut JoinCtx<'_>,
    side: Side,
    o: ObjId,
    off: IntRange,
    spec: TargetSpec,
    other: ValId,
    ldiff: i32,
    bump: u32,
) -> Result<Option<ValId>, JoinError> {
    let sh = side_heap(ctx, side);
    if !off.is_singular() || spec != TargetSpec::Region {
        return Ok(None);
    }
    if !sh.obj_is_valid(o)
        || sh.obj_kind(o) != ObjKind::Region
        || sh.obj_var(o).is_some()
        || mapped_dst(ctx, side, o).is_some()
    {
        return Ok(None);
    }
    let entry_off = off.lo;

    let mut best: Option<(i64, ValId, usize)> = None;
    for (f_off, fld) in sh.live_fields(o) {
        let mut cand = fld.val;
        let mut hops = 0;
        let ok = loop {
            let seeds = match side {
                Side::One => [(cand, other)],
                Side::Two => [(other, cand)],
            };
            if match_sub_heaps(ctx.sh1, ctx.sh2, &seeds, &mut SegSkipProbe::new()).is_some() {
                break true;
            }
            if hops == 8 {
                break false;
            }
            // step through one possibly-empty segment
            let Some((t, t_off, _)) = sh.val_target(cand) else {
                break false;
            };
            if !sh.obj_kind(t).is_abstract() || seg_min_length(sh, t) != 0 {
                break false;
            }
            let Some(b) = sh.obj_binding(t) else {
                break false;
            };
            if t_off != b.head {
                break false;
            }
            let next = if sh.obj_kind(t) == ObjKind::Dls && !sh.obj_is_dls_head(t) {
                seg_prev_val(sh, t)
            } else {
                seg_next_val(sh, t)
            };
            let Some(next) = next else {
                break false;
            };
            cand = next;
            hops += 1;
        };
        if !ok {
            continue;
        }
        let score = sh
            .val_any_target(fld.val)
            .map(|t| sh.refs_to(t).len())
            .unwrap_or(0);
        let better = match best {
            None => true,
            Some((b_off, _, b_score)) => match ctx.options.may_exist_heuristic {
                MayExistHeuristic::MostSharedTarget => {
                    score > b_score || (score == b_score && f_off < b_off)
                }
                MayExistHeuristic::LowestOffset => f_off < b_off,
            },
        };
        if better {
            best = Some((f_off, fld.val, score));
        }
    }
    let Some((sel_off, direct, _)) = best else {
        return Ok(None);
    };

    let d = clone_object(ctx, side, o, Some((o, sel_off)), bump);
    ctx.dst
        .make_opt(d, Some(BindingOff::sls(entry_off, sel_off)));
    let cont = match side {
        Side::One => join_values(ctx, direct, other, ldiff, bump)?,
        Side::Two => join_values(ctx, other, direct, ldiff, bump)?,
    };
    let ty = copy_field_ty(ctx.dst, sh, o, sel_off);
    ctx.dst.set_field(d, sel_off, ty, cont);

    ctx.escalate(JoinStatus::ThreeWay);
    ctx.stats.may_exist_wraps += 1;
    debug!(%o, sel_off, "wrapped concrete node as optional");
    Ok(Some(ctx.dst.val_addr(d, entry_off, TargetSpec::Region)))
}

// ═══════════════════════════════════════════════════════════════
// Post passes
// ═══════════════════════════════════════════════════════════════

/// Keep a disequality iff it is explicit in one input and provable in the
/// other through the join translations.
fn reconcile_neq(ctx: &mut JoinCtx<'_>) {
    let sh1 = ctx.sh1;
    let sh2 = ctx.sh2;
    let mut found: Vec<(ValId, ValId)> = Vec::new();
    for (a, b) in sh1.neq_pairs() {
        let (Some(da), Some(db)) = (ctx.val1_to_dst(a), ctx.val1_to_dst(b)) else {
            continue;
        };
        if da == db {
            continue;
        }
        let (Some(a2), Some(b2)) = (ctx.dst_to_val2(da), ctx.dst_to_val2(db)) else {
            continue;
        };
        if sh2.prove_neq(a2, b2) {
            found.push((da, db));
        }
    }
    for (a, b) in sh2.neq_pairs() {
        let (Some(da), Some(db)) = (ctx.val2_to_dst(a), ctx.val2_to_dst(b)) else {
            continue;
        };
        if da == db {
            continue;
        }
        let (Some(a1), Some(b1)) = (ctx.dst_to_val1(da), ctx.dst_to_val1(db)) else {
            continue;
        };
        if sh1.prove_neq(a1, b1) {
            found.push((da, db));
        }
    }
    for (a, b) in found {
        ctx.dst.add_neq(a, b);
    }
}

fn apply_proto_min_policy(ctx: &mut JoinCtx<'_>) {
    if ctx.options.preserve_proto_min_len {
        return;
    }
    let protos: Vec<ObjId> = ctx.protos.iter().map(|p| p.dst).collect();
    for d in protos {
        let d = ctx.resolve_dst(d);
        if ctx.dst.obj_is_valid(d) && matches!(ctx.dst.obj_kind(d), ObjKind::Sls | ObjKind::Dls) {
            ctx.dst.set_min_len(d, 0);
        }
    }
}

fn assert_no_placeholders(sh: &SymHeap) {
    if !cfg!(debug_assertions) {
        return;
    }
    for obj in sh.live_objects() {
        for (off, fld) in sh.live_fields(obj) {
            debug_assert!(!fld.val.is_invalid(), "placeholder left at {obj}+{off}");
        }
    }
}

fn attach_trace(
    dst: &mut SymHeap,
    sh1: &SymHeap,
    sh2: &SymHeap,
    status: JoinStatus,
    tg: &mut TraceGraph,
) {
    let node = match status {
        JoinStatus::UseAny | JoinStatus::UseSh1 => sh1.trace_node().map(|t| tg.clone_of(t)),
        JoinStatus::UseSh2 => sh2.trace_node().map(|t| tg.clone_of(t)),
        JoinStatus::ThreeWay => match (sh1.trace_node(), sh2.trace_node()) {
            (Some(a), Some(b)) => Some(tg.join_of(a, b)),
            _ => None,
        },
    };
    let node = match node {
        Some(n) => n,
        None => tg.root(),
    };
    dst.set_trace_node(node);
}

// ═══════════════════════════════════════════════════════════════
// Small helpers
// ═══════════════════════════════════════════════════════════════

fn side_heap<'h>(ctx: &JoinCtx<'h>, side: Side) -> &'h SymHeap {
    match side {
        Side::One => ctx.sh1,
        Side::Two => ctx.sh2,
    }
}

fn mapped_dst(ctx: &JoinCtx<'_>, side: Side, o: ObjId) -> Option<ObjId> {
    match side {
        Side::One => ctx.dst_of1(o),
        Side::Two => ctx.dst_of2(o),
    }
}

fn map_side(ctx: &mut JoinCtx<'_>, side: Side, o: ObjId, d: ObjId) {
    match side {
        Side::One => ctx.map_pair(Some(o), None, d),
        Side::Two => ctx.map_pair(None, Some(o), d),
    }
}

fn orient(side: Side, v_ptr: ValId, other: ValId) -> (ValId, ValId) {
    match side {
        Side::One => (v_ptr, other),
        Side::Two => (other, v_ptr),
    }
}

fn ptr_view(sh: &SymHeap, v: ValId) -> Option<(ObjId, IntRange, TargetSpec)> {
    if let Some((o, off, sp)) = sh.val_target(v) {
        return Some((o, IntRange::num(off), sp));
    }
    sh.val_range_target(v)
}

fn root_addr(sh: &SymHeap, obj: ObjId) -> ValId {
    match sh.try_val_addr(obj, 0, TargetSpec::Region) {
        Some(v) => v,
        None => unreachable!("object {obj} lost its address"),
    }
}

fn dls_peer(sh: &SymHeap, obj: ObjId) -> ObjId {
    match sh.obj_peer(obj) {
        Some(p) => p,
        None => unreachable!("doubly-linked segment {obj} without a peer"),
    }
}

fn copy_type(dst: &mut SymHeap, src: &SymHeap, ty: Option<TypeId>) -> Option<TypeId> {
    ty.map(|t| {
        let row = src.type_row(t);
        dst.type_intern(&row.name, row.size)
    })
}

fn copy_row(dst: &mut SymHeap, src: &SymHeap, ty: TypeId) -> TypeId {
    let row = src.type_row(ty);
    dst.type_intern(&row.name, row.size)
}

fn copy_field_ty(dst: &mut SymHeap, src: &SymHeap, o: ObjId, off: i64) -> TypeId {
    match src.field_at(o, off) {
        Some(f) => copy_row(dst, src, f.ty),
        None => unreachable!("missing field at {o}+{off}"),
    }
}

/// Lookahead probe for insertion and may-exist decisions: pairs where
/// exactly one side sits in an abstract object are accepted without
/// expansion, since a nested insertion will reconcile them later.
struct SegSkipProbe {
    left: usize,
}

impl SegSkipProbe {
    fn new() -> SegSkipProbe {
        SegSkipProbe { left: 4096 }
    }
}

impl SubHeapVisitor for SegSkipProbe {
    fn enter_pair(&mut self, sh1: &SymHeap, sh2: &SymHeap, v1: ValId, v2: ValId) -> Visit {
        self.left = self.left.saturating_sub(1);
        let abs1 = sh1
            .val_any_target(v1)
            .map(|o| sh1.obj_kind(o).is_abstract())
            .unwrap_or(false);
        let abs2 = sh2
            .val_any_target(v2)
            .map(|o| sh2.obj_kind(o).is_abstract())
            .unwrap_or(false);
        if abs1 != abs2 {
            Visit::Skip
        } else {
            Visit::Expand
        }
    }

    fn cancelled(&self) -> bool {
        self.left == 0
    }
}
