//! Proving that two accesses touch adjacent memory

use super::access::MemoryAccess;
use crate::ir::analysis::value_tracking::{
    is_pointer_bitcast, strip_inbounds_constant_offsets, wrap_to_bits,
};
use crate::ir::analysis::AnalysisContext;
use crate::ir::{
    BinaryOp, CastOp, GepIndex, InstId, IrFunction, IrId, IrInstruction, IrValue,
};

/// Whether the access `b` starts exactly where the access `a` ends
pub fn is_consecutive_access(
    func: &IrFunction,
    ctx: &AnalysisContext<'_>,
    a: InstId,
    b: InstId,
) -> bool {
    let (Some(access_a), Some(access_b)) =
        (MemoryAccess::from_inst(func, a), MemoryAccess::from_inst(func, b))
    else {
        return false;
    };
    is_consecutive(func, ctx, &access_a, &access_b)
}

fn is_consecutive(
    func: &IrFunction,
    ctx: &AnalysisContext<'_>,
    a: &MemoryAccess,
    b: &MemoryAccess,
) -> bool {
    if a.addr_space != b.addr_space || a.ptr == b.ptr {
        return false;
    }
    if is_null_constant(func, a.ptr) || is_null_constant(func, b.ptr) {
        return false;
    }

    let layout = ctx.layout;
    let size = layout.store_size_bytes(&a.ty);
    if size != layout.store_size_bytes(&b.ty)
        || layout.store_size_bytes(a.ty.scalar_type())
            != layout.store_size_bytes(b.ty.scalar_type())
    {
        return false;
    }
    let Ok(size) = i64::try_from(size) else {
        return false;
    };

    let pointer_bits = layout.pointer_size_bits(a.addr_space);
    let (base_a, offset_a) = strip_inbounds_constant_offsets(func, layout, a.ptr);
    let (base_b, offset_b) = strip_inbounds_constant_offsets(func, layout, b.ptr);
    let offset_delta = wrap_to_bits(offset_b.wrapping_sub(offset_a), pointer_bits);

    if base_a == base_b {
        return offset_delta == wrap_to_bits(size, pointer_bits);
    }

    // base_a + (size - delta) == base_b
    let base_delta = size.wrapping_sub(offset_delta);
    let expr_a = ctx.symbolic.symbolic(func, base_a).add_constant(base_delta);
    if expr_a == ctx.symbolic.symbolic(func, base_b) {
        return true;
    }

    adjacent_gep_indices(func, ctx, a.ptr, b.ptr)
}

fn is_null_constant(func: &IrFunction, value: IrId) -> bool {
    matches!(
        func.def_of(value),
        Some((
            _,
            IrInstruction::Const {
                value: IrValue::Null,
                ..
            }
        ))
    )
}

/// GEP defining `ptr`, looking through pointer bitcasts
fn source_gep(func: &IrFunction, mut ptr: IrId) -> Option<&IrInstruction> {
    for _ in 0..8 {
        let (_, inst) = func.def_of(ptr)?;
        match inst {
            IrInstruction::GetElementPtr { .. } => return Some(inst),
            IrInstruction::Cast { op, src, ty, .. } if is_pointer_bitcast(func, *op, *src, ty) => {
                ptr = *src;
            }
            _ => return None,
        }
    }
    None
}

/// Two GEPs that differ only in a final index `ext(x)` vs `ext(x + 1)`,
/// where the addition is known not to overflow before the extension.
fn adjacent_gep_indices(func: &IrFunction, ctx: &AnalysisContext<'_>, ptr_a: IrId, ptr_b: IrId) -> bool {
    let (
        Some(IrInstruction::GetElementPtr {
            ptr: base_a,
            source_ty: ty_a,
            indices: indices_a,
            ..
        }),
        Some(IrInstruction::GetElementPtr {
            ptr: base_b,
            source_ty: ty_b,
            indices: indices_b,
            ..
        }),
    ) = (source_gep(func, ptr_a), source_gep(func, ptr_b))
    else {
        return false;
    };

    if base_a != base_b || ty_a != ty_b || indices_a.len() != indices_b.len() {
        return false;
    }
    let Some(last) = indices_a.len().checked_sub(1) else {
        return false;
    };
    if indices_a[..last] != indices_b[..last] {
        return false;
    }

    let (GepIndex::Value(index_a), GepIndex::Value(index_b)) = (indices_a[last], indices_b[last])
    else {
        return false;
    };
    let (
        Some((
            _,
            IrInstruction::Cast {
                op: ext_a,
                src: op_a,
                ty: wide_a,
                ..
            },
        )),
        Some((
            _,
            IrInstruction::Cast {
                op: ext_b,
                src: op_b,
                ty: wide_b,
                ..
            },
        )),
    ) = (func.def_of(index_a), func.def_of(index_b))
    else {
        return false;
    };
    if ext_a != ext_b || wide_a != wide_b || !matches!(ext_a, CastOp::SExt | CastOp::ZExt) {
        return false;
    }
    let signed = *ext_a == CastOp::SExt;

    let (op_a, op_b) = (*op_a, *op_b);
    if func.def_inst(op_a).is_none() || func.def_inst(op_b).is_none() {
        return false;
    }
    let Some(narrow) = func.value_type(op_a) else {
        return false;
    };
    if func.value_type(op_b) != Some(narrow) {
        return false;
    }

    if !increment_cannot_overflow(func, ctx, op_a, op_b, signed) {
        return false;
    }

    ctx.symbolic.symbolic(func, op_a).add_constant(1) == ctx.symbolic.symbolic(func, op_b)
}

fn increment_cannot_overflow(
    func: &IrFunction,
    ctx: &AnalysisContext<'_>,
    op_a: IrId,
    op_b: IrId,
    signed: bool,
) -> bool {
    // op_b = add op_a', C with C > 0 and the matching no-wrap flag
    if let Some((
        _,
        IrInstruction::BinOp {
            op: BinaryOp::Add,
            right,
            wrap,
            ..
        },
    )) = func.def_of(op_b)
    {
        let positive_constant = matches!(
            func.def_of(*right),
            Some((_, IrInstruction::Const { value: IrValue::Int(c), .. })) if *c > 0
        );
        let no_wrap = if signed { wrap.nsw } else { wrap.nuw };
        if positive_constant && no_wrap {
            return true;
        }
    }

    // Any known-zero bit below the sign bit leaves room for +1
    let bits = func
        .value_type(op_a)
        .map(|t| ctx.layout.type_size_bits(t))
        .unwrap_or(0);
    if bits == 0 || bits > 64 {
        return false;
    }
    let below_sign = if bits == 64 {
        u64::MAX >> 1
    } else {
        (1u64 << (bits - 1)) - 1
    };
    ctx.symbolic.known_zero_bits(func, op_a) & below_sign != 0
}
