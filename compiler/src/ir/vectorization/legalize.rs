//! Vector shape, width and alignment of a chain

use super::access::MemoryAccess;
use super::VectorizeError;
use crate::ir::analysis::value_tracking::decompose_pointer;
use crate::ir::analysis::LayoutOracle;
use crate::ir::{InstId, IrFunction, IrInstruction, IrType};

/// The type every chain element is viewed as, and the merged vector type
#[derive(Debug, Clone, PartialEq)]
pub struct ChainShape {
    /// Type of one element; a vector for chains of vector accesses
    pub element_ty: IrType,
    /// Lane type of the merged vector
    pub lane_ty: IrType,
    pub lanes_per_element: usize,
    pub element_bits: u64,
    pub addr_space: u32,
}

impl ChainShape {
    /// Pick the element type for `chain`.
    ///
    /// Integer members win, then pointers (as integers of the pointer width),
    /// then the first member's type. `Ok(None)` when members disagree on being
    /// vectors or on their lane count.
    pub fn analyze(
        func: &IrFunction,
        layout: &dyn LayoutOracle,
        chain: &[InstId],
    ) -> Result<Option<ChainShape>, VectorizeError> {
        let accesses = chain
            .iter()
            .map(|&id| MemoryAccess::from_inst(func, id).ok_or(VectorizeError::NotAMemoryAccess(id)))
            .collect::<Result<Vec<_>, _>>()?;
        let Some(first) = accesses.first() else {
            return Ok(None);
        };

        let lane_count = first.ty.vector_count();
        if accesses.iter().any(|a| a.ty.vector_count() != lane_count) {
            return Ok(None);
        }

        let element_ty = if let Some(int) = accesses.iter().find(|a| a.ty.is_int_or_int_vector()) {
            int.ty.clone()
        } else if let Some(ptr) = accesses.iter().find(|a| a.ty.is_ptr_or_ptr_vector()) {
            let space = ptr.ty.addr_space().unwrap_or(first.addr_space);
            let int = IrType::int(layout.pointer_size_bits(space));
            match ptr.ty.vector_count() {
                Some(count) => IrType::vector(int, count),
                None => int,
            }
        } else {
            first.ty.clone()
        };

        Ok(Some(ChainShape {
            lane_ty: element_ty.scalar_type().clone(),
            lanes_per_element: lane_count.unwrap_or(1),
            element_bits: layout.type_size_bits(&element_ty),
            element_ty,
            addr_space: first.addr_space,
        }))
    }

    /// Merged vector type for a chain of `len` elements
    pub fn vector_type(&self, len: usize) -> IrType {
        IrType::vector(self.lane_ty.clone(), len * self.lanes_per_element)
    }

    pub fn element_bytes(&self) -> u64 {
        self.element_bits / 8
    }
}

/// What to do with a chain of a given length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidthPlan {
    /// The chain can be emitted as one access
    Accept,
    /// Not vectorizable at any length
    Reject,
    /// Retry without the last element
    DropLast,
    /// Retry both `[..at]` and `[at..]`
    SplitAt(usize),
}

/// Legal widths: power-of-two elements, at least two per register, and a
/// total size of 1, 2 or a multiple of 4 bytes no wider than the register.
pub fn plan_width(element_bits: u64, len: usize, register_bits: u32) -> WidthPlan {
    if element_bits == 0 || !element_bits.is_power_of_two() {
        return WidthPlan::Reject;
    }
    let vf = u64::from(register_bits) / element_bits;
    if vf < 2 || len < 2 {
        return WidthPlan::Reject;
    }

    let element_bytes = element_bits / 8;
    let total_bytes = element_bytes * len as u64;
    if total_bytes > 2 && total_bytes % 4 != 0 {
        if total_bytes == 3 {
            return WidthPlan::DropLast;
        }
        // The right part keeps the bytes past the last multiple of 4
        let left = ((total_bytes - total_bytes % 4) / element_bytes.max(1)).max(1) as usize;
        return WidthPlan::SplitAt(left.min(len - 1));
    }

    if len as u64 > vf {
        return WidthPlan::SplitAt(vf as usize);
    }
    WidthPlan::Accept
}

/// Alignment of the merged access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignDecision {
    /// Use this alignment as is
    Aligned(u32),
    /// Raise the stack slot defined by `alloca` to `align` and use that
    RaiseAlloca { alloca: InstId, align: u32 },
    Misaligned,
}

impl AlignDecision {
    pub fn align(&self) -> Option<u32> {
        match self {
            AlignDecision::Aligned(align) | AlignDecision::RaiseAlloca { align, .. } => Some(*align),
            AlignDecision::Misaligned => None,
        }
    }
}

/// Decide the alignment of a merged access of `total_bytes` starting at `first`
pub fn resolve_alignment(
    func: &IrFunction,
    layout: &dyn LayoutOracle,
    first: &MemoryAccess,
    total_bytes: u64,
    base_align: u32,
) -> AlignDecision {
    let align = first.effective_align(layout);
    let base = u64::from(base_align.max(1));
    if u64::from(align) % total_bytes.max(1) == 0 || u64::from(align) % base == 0 {
        return AlignDecision::Aligned(align);
    }

    if first.addr_space != 0 {
        return AlignDecision::Misaligned;
    }
    // Only a stack slot we can realign, addressed at a multiple of the new alignment
    let (object, offset) = decompose_pointer(func, layout, first.ptr);
    let Some((alloca, IrInstruction::Alloca { .. })) = func.def_of(object) else {
        return AlignDecision::Misaligned;
    };
    match offset {
        Some(offset) if offset.rem_euclid(base as i64) == 0 => AlignDecision::RaiseAlloca {
            alloca,
            align: base_align,
        },
        _ => AlignDecision::Misaligned,
    }
}

/// Raise an alloca's alignment, never lowering it
pub fn raise_alloca_alignment(func: &mut IrFunction, alloca: InstId, align: u32) -> bool {
    match func.inst_mut(alloca) {
        Some(IrInstruction::Alloca { align: current, .. }) => {
            *current = (*current).max(align);
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::analysis::DataLayout;
    use crate::ir::{FunctionBuilder, IrFunctionId};

    #[test]
    fn test_plan_width() {
        assert_eq!(plan_width(32, 4, 128), WidthPlan::Accept);
        assert_eq!(plan_width(32, 2, 128), WidthPlan::Accept);
        assert_eq!(plan_width(16, 8, 64), WidthPlan::SplitAt(4));
        assert_eq!(plan_width(32, 1, 128), WidthPlan::Reject);
        assert_eq!(plan_width(24, 4, 128), WidthPlan::Reject);
        assert_eq!(plan_width(64, 4, 64), WidthPlan::Reject);
        // 3 bytes: drop the last
        assert_eq!(plan_width(8, 3, 128), WidthPlan::DropLast);
        // 5 bytes: 4 + 1
        assert_eq!(plan_width(8, 5, 128), WidthPlan::SplitAt(4));
        // 6 bytes of i16: 4 + 2
        assert_eq!(plan_width(16, 3, 128), WidthPlan::SplitAt(2));
        assert_eq!(plan_width(8, 2, 128), WidthPlan::Accept);
    }

    /// Apply a plan recursively and collect the accepted pieces
    fn pieces(element_bits: u64, len: usize, register_bits: u32) -> Vec<usize> {
        match plan_width(element_bits, len, register_bits) {
            WidthPlan::Accept => vec![len],
            WidthPlan::Reject => vec![],
            WidthPlan::DropLast => pieces(element_bits, len - 1, register_bits),
            WidthPlan::SplitAt(at) => {
                let mut out = pieces(element_bits, at, register_bits);
                out.extend(pieces(element_bits, len - at, register_bits));
                out
            }
        }
    }

    #[test]
    fn test_every_piece_is_legal() {
        for element_bits in [8u64, 16, 32, 64] {
            for register_bits in [64u32, 128, 256] {
                for len in 1..=40 {
                    for piece in pieces(element_bits, len, register_bits) {
                        let bytes = element_bits / 8 * piece as u64;
                        assert!(bytes == 1 || bytes == 2 || bytes % 4 == 0, "{} bytes", bytes);
                        assert!(piece as u64 <= u64::from(register_bits) / element_bits);
                        assert!(piece >= 2);
                    }
                }
            }
        }
    }

    #[test]
    fn test_chain_shape() {
        let dl = DataLayout::default();
        let mut func = IrFunction::new(IrFunctionId(0), "f", IrType::Void);
        let p = func.add_parameter("p", IrType::ptr(IrType::F32), false);
        let mut b = FunctionBuilder::new(&mut func);
        let p1 = b.build_elem_ptr(p, IrType::F32, 1).unwrap();
        let f = b.build_load(p, IrType::F32, 4).unwrap();
        let ip = b.build_bitcast(p1, IrType::ptr(IrType::I32)).unwrap();
        let i = b.build_load(ip, IrType::I32, 4).unwrap();
        let q = b.build_bitcast(p, IrType::ptr(IrType::ptr(IrType::I8))).unwrap();
        let ptr = b.build_load(q, IrType::ptr(IrType::I8), 8).unwrap();
        let d = b.build_load(q, IrType::F64, 8).unwrap();
        let v = b
            .build_load(q, IrType::vector(IrType::I32, 2), 8)
            .unwrap();
        let ids = |vals: &[crate::ir::IrId]| -> Vec<InstId> {
            vals.iter().map(|v| func.def_inst(*v).unwrap()).collect()
        };

        let shape = ChainShape::analyze(&func, &dl, &ids(&[f, i])).unwrap().unwrap();
        assert_eq!(shape.element_ty, IrType::I32);
        assert_eq!(shape.vector_type(2), IrType::vector(IrType::I32, 2));

        let shape = ChainShape::analyze(&func, &dl, &ids(&[d, ptr])).unwrap().unwrap();
        assert_eq!(shape.element_ty, IrType::I64);

        let shape = ChainShape::analyze(&func, &dl, &ids(&[f, f])).unwrap().unwrap();
        assert_eq!(shape.element_ty, IrType::F32);
        assert_eq!(shape.element_bytes(), 4);

        assert_eq!(ChainShape::analyze(&func, &dl, &ids(&[d, v])).unwrap(), None);
        assert!(matches!(
            ChainShape::analyze(&func, &dl, &[func.def_inst(p1).unwrap()]),
            Err(VectorizeError::NotAMemoryAccess(_))
        ));
    }

    #[test]
    fn test_alignment() {
        let dl = DataLayout::default();
        let mut func = IrFunction::new(IrFunctionId(0), "f", IrType::Void);
        let g = func.add_parameter("g", IrType::ptr(IrType::I8), false);
        let mut b = FunctionBuilder::new(&mut func);
        let slot = b.build_alloca(IrType::Array(Box::new(IrType::I8), 8), 1).unwrap();
        let s0 = b.build_bitcast(slot, IrType::ptr(IrType::I8)).unwrap();
        let s1 = b.build_elem_ptr(s0, IrType::I8, 1).unwrap();
        let s4 = b.build_elem_ptr(s0, IrType::I8, 4).unwrap();
        let a0 = b.build_load(s0, IrType::I8, 1).unwrap();
        let a1 = b.build_load(s1, IrType::I8, 1).unwrap();
        let a4 = b.build_load(s4, IrType::I8, 1).unwrap();
        let ga = b.build_load(g, IrType::I8, 1).unwrap();
        let ok = b.build_load(g, IrType::I32, 4).unwrap();
        let access = |v| MemoryAccess::from_inst(&func, func.def_inst(v).unwrap()).unwrap();
        let alloca = func.def_inst(slot).unwrap();

        assert_eq!(resolve_alignment(&func, &dl, &access(ok), 16, 4), AlignDecision::Aligned(4));
        // Four bytes at align 1 need a realigned stack slot
        assert_eq!(
            resolve_alignment(&func, &dl, &access(a0), 4, 4),
            AlignDecision::RaiseAlloca { alloca, align: 4 }
        );
        assert_eq!(
            resolve_alignment(&func, &dl, &access(a4), 4, 4),
            AlignDecision::RaiseAlloca { alloca, align: 4 }
        );
        assert_eq!(resolve_alignment(&func, &dl, &access(a1), 4, 4), AlignDecision::Misaligned);
        assert_eq!(resolve_alignment(&func, &dl, &access(ga), 4, 4), AlignDecision::Misaligned);
        assert_eq!(resolve_alignment(&func, &dl, &access(ga), 1, 4), AlignDecision::Aligned(1));

        assert!(raise_alloca_alignment(&mut func, alloca, 4));
        assert!(matches!(func.inst(alloca), Some(IrInstruction::Alloca { align: 4, .. })));
        assert!(raise_alloca_alignment(&mut func, alloca, 2));
        assert!(matches!(func.inst(alloca), Some(IrInstruction::Alloca { align: 4, .. })));
    }
}
