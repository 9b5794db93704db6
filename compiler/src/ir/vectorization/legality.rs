//! May a chain be merged without changing what memory observes?
//!
//! A merged load is emitted after the chain's last member, a merged store
//! likewise. Every memory access between the first and the last member
//! that would be reordered against a member is checked for aliasing.
//!
//! For loads, instructions in the range that consume a member's value must
//! follow the merged load; they are relocated after it and so move past
//! everything behind them in the range.

use super::access::{AccessKind, MemoryAccess};
use super::VectorizeError;
use crate::ir::analysis::{AnalysisContext, MemoryLocation};
use crate::ir::dump::dump_inst;
use crate::ir::{InstId, IrFunction, IrId, IrInstruction, MemoryEffects};
use fxhash::FxHashSet;
use log::debug;

/// A load or store inside the chain's range
#[derive(Debug, Clone, Copy)]
struct RangeAccess {
    id: InstId,
    pos: usize,
    loc: MemoryLocation,
    is_load: bool,
    /// Consumes a member's value and will follow the merged load
    relocated: bool,
}

/// Check whether `chain` can be merged into one access of `kind`.
///
/// `Ok(false)` means "leave the chain alone"; an error means the chain is
/// malformed.
pub fn check_chain(
    func: &IrFunction,
    ctx: &AnalysisContext<'_>,
    chain: &[InstId],
    kind: AccessKind,
) -> Result<bool, VectorizeError> {
    let Some(&leader) = chain.first() else {
        return Ok(false);
    };
    let block = func
        .block_of(leader)
        .ok_or(VectorizeError::MissingInstruction(leader))?;
    let members: FxHashSet<InstId> = chain.iter().copied().collect();

    let body = func.block_instructions(block);
    let (Some(start), Some(end)) = (
        body.iter().position(|id| members.contains(id)),
        body.iter().rposition(|id| members.contains(id)),
    ) else {
        return Err(VectorizeError::ChainMemberOutsideRange { inst: leader });
    };
    let range = &body[start..=end];
    if let Some(&missing) = chain.iter().find(|&&id| !range.contains(&id)) {
        return Err(VectorizeError::ChainMemberOutsideRange { inst: missing });
    }

    let mut member_accesses = Vec::with_capacity(chain.len());
    let mut other_accesses = Vec::new();
    let mut reading_calls: Vec<(usize, bool)> = Vec::new();
    let mut tainted: FxHashSet<IrId> = FxHashSet::default();

    for (pos, &id) in range.iter().enumerate() {
        let inst = func.inst(id).ok_or(VectorizeError::MissingInstruction(id))?;

        if members.contains(&id) {
            let access =
                range_access(func, ctx, id, pos, false).ok_or(VectorizeError::NotAMemoryAccess(id))?;
            if let (AccessKind::Load, Some(dest)) = (kind, inst.dest()) {
                tainted.insert(dest);
            }
            member_accesses.push(access);
            continue;
        }

        let relocated =
            kind == AccessKind::Load && inst.uses().iter().any(|used| tainted.contains(used));
        if relocated {
            if let Some(dest) = inst.dest() {
                tainted.insert(dest);
            }
        }

        match inst {
            IrInstruction::Load { .. } | IrInstruction::Store { .. } => {
                let access = range_access(func, ctx, id, pos, relocated)
                    .ok_or(VectorizeError::NotAMemoryAccess(id))?;
                other_accesses.push(access);
            }
            IrInstruction::Call { effects, .. } => match (effects, kind) {
                (MemoryEffects::None, _) => {}
                (MemoryEffects::ReadOnly, AccessKind::Load) => reading_calls.push((pos, relocated)),
                _ => {
                    debug!("LSV: Found side-effecting operation: {}", dump_inst(func, id).trim());
                    return Ok(false);
                }
            },
            other if other.has_side_effects() => {
                debug!("LSV: Found side-effecting operation: {}", dump_inst(func, id).trim());
                return Ok(false);
            }
            _ => {}
        }
    }

    for other in &other_accesses {
        for member in &member_accesses {
            if other.is_load && member.is_load {
                continue;
            }
            if !other.relocated && other.pos < member.pos {
                // The merged access sits at the end of the range, so earlier
                // loads still read before a merged store and earlier stores
                // still land before a merged load.
                match kind {
                    AccessKind::Load if !other.is_load => continue,
                    AccessKind::Store if other.is_load => continue,
                    _ => {}
                }
            }
            if ctx.alias.may_alias(func, &other.loc, &member.loc) {
                log_alias(func, other.id, member.id);
                return Ok(false);
            }
        }
    }

    // Relocated accesses overtake everything after them and may be reordered
    // among themselves
    for moved in other_accesses.iter().filter(|a| a.relocated) {
        for other in &other_accesses {
            if other.id == moved.id || (moved.is_load && other.is_load) {
                continue;
            }
            let overtaken = other.relocated || other.pos > moved.pos;
            if overtaken && ctx.alias.may_alias(func, &moved.loc, &other.loc) {
                log_alias(func, moved.id, other.id);
                return Ok(false);
            }
        }
    }

    for &(pos, relocated) in &reading_calls {
        if !relocated {
            continue;
        }
        let crosses_store = other_accesses
            .iter()
            .any(|a| !a.is_load && (a.relocated || a.pos > pos));
        if crosses_store {
            debug!("LSV: Memory-reading call would move past a store");
            return Ok(false);
        }
    }

    Ok(true)
}

fn range_access(
    func: &IrFunction,
    ctx: &AnalysisContext<'_>,
    id: InstId,
    pos: usize,
    relocated: bool,
) -> Option<RangeAccess> {
    let access = MemoryAccess::from_inst(func, id)?;
    Some(RangeAccess {
        id,
        pos,
        loc: MemoryLocation::new(access.ptr, access.store_size(ctx.layout)),
        is_load: access.kind == AccessKind::Load,
        relocated,
    })
}

fn log_alias(func: &IrFunction, a: InstId, b: InstId) {
    debug!(
        "LSV: Found alias:\n  {}\n  {}",
        dump_inst(func, a).trim(),
        dump_inst(func, b).trim()
    );
}
