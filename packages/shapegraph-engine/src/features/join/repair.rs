//! Folding of duplicate destination objects.
//!
//! The drain occasionally learns late that two destination objects stand for
//! the same joined location, typically when a one-sided clone ran ahead of a
//! two-sided join of the same source. The repair merges the stale object
//! into the surviving one, retargets every address, and leaves a redirect so
//! still-pending items land on the survivor.

use tracing::debug;

use crate::features::compare::types_match;
use crate::features::symheap::{seg_min_length, Field, ObjKind, UniBlock};
use crate::shared::models::ObjId;

use super::context::JoinCtx;
use super::JoinError;

pub(crate) fn rejoin_objects(
    ctx: &mut JoinCtx<'_>,
    stale: ObjId,
    keep: ObjId,
) -> Result<(), JoinError> {
    let stale = ctx.resolve_dst(stale);
    let keep = ctx.resolve_dst(keep);
    if stale == keep {
        return Ok(());
    }
    let conflict = JoinError::RepairConflict { stale, keep };
    if !ctx.dst.obj_is_valid(stale) || !ctx.dst.obj_is_valid(keep) {
        return Err(conflict);
    }
    if ctx.dst.obj_size(stale) != ctx.dst.obj_size(keep)
        || ctx.dst.obj_var(stale).is_some()
        || ctx.dst.obj_proto_level(stale) != ctx.dst.obj_proto_level(keep)
        || !types_match(
            ctx.dst,
            ctx.dst.obj_type(stale),
            ctx.dst,
            ctx.dst.obj_type(keep),
        )
    {
        return Err(conflict);
    }

    let ks = ctx.dst.obj_kind(stale);
    let kk = ctx.dst.obj_kind(keep);
    // peer bookkeeping of a doubly-linked pair does not survive folding
    if ks == ObjKind::Dls || kk == ObjKind::Dls {
        return Err(conflict);
    }
    let binding = match (ctx.dst.obj_binding(stale), ctx.dst.obj_binding(keep)) {
        (Some(a), Some(b)) if a != b => return Err(conflict),
        (a, b) => a.or(b),
    };

    let min_stale = seg_min_length(ctx.dst, stale);
    let min_keep = seg_min_length(ctx.dst, keep);
    let dominant = ks.max(kk);
    if dominant != kk {
        match dominant {
            ObjKind::Opt01 => ctx.dst.make_opt(keep, binding),
            ObjKind::Sls => match binding {
                Some(b) => ctx.dst.make_sls(keep, b, 0),
                None => unreachable!("segment {stale} without a binding"),
            },
            ObjKind::Region | ObjKind::Dls => {
                unreachable!("kind fold from {ks:?} to {kk:?}")
            }
        }
    }
    if dominant == ObjKind::Sls {
        let cap = ctx.options.max_seg_min_len;
        ctx.dst.set_min_len(keep, min_stale.min(min_keep).min(cap));
    }

    let fields: Vec<(i64, Field)> = ctx.dst.live_fields(stale).collect();
    for (off, fld) in fields {
        if ctx.dst.field_at(keep, off).is_none() {
            ctx.dst.set_field(keep, off, fld.ty, fld.val);
        }
    }
    let blocks: Vec<UniBlock> = ctx.dst.uni_blocks(stale).values().copied().collect();
    for block in blocks {
        if !ctx.dst.uni_blocks(keep).contains_key(&block.off) {
            ctx.dst.write_uni_block(keep, block);
        }
    }

    let merges = ctx.dst.redirect_target(stale, keep);
    ctx.apply_value_merges(&merges);
    ctx.note_redirect(stale, keep);
    ctx.dst.destroy_obj(stale);
    ctx.stats.repairs += 1;
    debug!(%stale, %keep, "folded duplicate destination");
    Ok(())
}
