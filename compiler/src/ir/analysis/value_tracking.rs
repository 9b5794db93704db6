//! Pointer decomposition helpers shared by the analyses and the vectorizer

use super::LayoutOracle;
use crate::ir::{CastOp, GepIndex, IrFunction, IrId, IrInstruction, IrType};

/// Sign-extend the low `bits` bits of `value`.
pub fn wrap_to_bits(value: i64, bits: u32) -> i64 {
    if bits == 0 || bits >= 64 {
        return value;
    }
    let shift = 64 - bits;
    (value << shift) >> shift
}

/// Whether a cast only reinterprets one pointer as another
pub fn is_pointer_bitcast(func: &IrFunction, op: CastOp, src: IrId, ty: &IrType) -> bool {
    op == CastOp::BitCast
        && ty.is_pointer()
        && func.value_type(src).is_some_and(|t| t.is_pointer())
}

/// Byte offset added by a GEP whose indices are all constant
pub fn gep_constant_offset(
    layout: &dyn LayoutOracle,
    source_ty: &IrType,
    indices: &[GepIndex],
) -> Option<i64> {
    let mut offset: i64 = 0;
    let mut current = source_ty;
    for (i, index) in indices.iter().enumerate() {
        let GepIndex::Const(c) = *index else {
            return None;
        };
        if i == 0 {
            let stride = i64::try_from(layout.alloc_size_bytes(current)).ok()?;
            offset = offset.wrapping_add(c.wrapping_mul(stride));
            continue;
        }
        match current {
            IrType::Struct { fields, .. } => {
                let field = usize::try_from(c).ok()?;
                let field_offset = layout.struct_field_offset(fields, field)?;
                offset = offset.wrapping_add(i64::try_from(field_offset).ok()?);
                current = fields.get(field)?;
            }
            IrType::Array(elem, _) | IrType::Vector { element: elem, .. } => {
                let stride = i64::try_from(layout.alloc_size_bytes(elem)).ok()?;
                offset = offset.wrapping_add(c.wrapping_mul(stride));
                current = elem;
            }
            _ => return None,
        }
    }
    Some(offset)
}

/// Strip in-bounds constant-offset GEPs and pointer bitcasts from `ptr`.
///
/// Returns the remaining base pointer and the accumulated byte offset,
/// wrapped to the pointer width of the address space.
pub fn strip_inbounds_constant_offsets(
    func: &IrFunction,
    layout: &dyn LayoutOracle,
    ptr: IrId,
) -> (IrId, i64) {
    let bits = func
        .value_type(ptr)
        .and_then(|t| t.addr_space())
        .map(|space| layout.pointer_size_bits(space))
        .unwrap_or(64);

    let mut current = ptr;
    let mut offset: i64 = 0;
    // Bounded walk; SSA chains cannot cycle but malformed IR could
    for _ in 0..64 {
        let Some((_, inst)) = func.def_of(current) else {
            break;
        };
        match inst {
            IrInstruction::GetElementPtr {
                ptr,
                source_ty,
                indices,
                inbounds: true,
                ..
            } => match gep_constant_offset(layout, source_ty, indices) {
                Some(delta) => {
                    offset = offset.wrapping_add(delta);
                    current = *ptr;
                }
                None => break,
            },
            IrInstruction::Cast { op, src, ty, .. } if is_pointer_bitcast(func, *op, *src, ty) => {
                current = *src;
            }
            _ => break,
        }
    }
    (current, wrap_to_bits(offset, bits))
}

/// Base object of a pointer: strips every GEP and pointer bitcast,
/// looking through at most `max_depth` of them.
pub fn underlying_object(func: &IrFunction, ptr: IrId, max_depth: usize) -> IrId {
    let mut current = ptr;
    for _ in 0..max_depth {
        let Some((_, inst)) = func.def_of(current) else {
            return current;
        };
        match inst {
            IrInstruction::GetElementPtr { ptr, .. } => current = *ptr,
            IrInstruction::Cast { op, src, ty, .. } if is_pointer_bitcast(func, *op, *src, ty) => {
                current = *src
            }
            _ => return current,
        }
    }
    current
}

/// Base pointer and, when every step is constant, the byte offset from it.
///
/// Unlike [`strip_inbounds_constant_offsets`] this looks through GEPs with
/// variable indices, giving up only on the offset.
pub fn decompose_pointer(
    func: &IrFunction,
    layout: &dyn LayoutOracle,
    ptr: IrId,
) -> (IrId, Option<i64>) {
    let mut current = ptr;
    let mut offset = Some(0i64);
    for _ in 0..64 {
        let Some((_, inst)) = func.def_of(current) else {
            break;
        };
        match inst {
            IrInstruction::GetElementPtr {
                ptr,
                source_ty,
                indices,
                ..
            } => {
                offset = offset.and_then(|o| {
                    gep_constant_offset(layout, source_ty, indices).map(|d| o.wrapping_add(d))
                });
                current = *ptr;
            }
            IrInstruction::Cast { op, src, ty, .. } if is_pointer_bitcast(func, *op, *src, ty) => {
                current = *src;
            }
            _ => break,
        }
    }
    (current, offset)
}
