//! Basic alias analysis
//!
//! Answers from the shape of the two pointers alone: a common base with known
//! offsets, distinct identified objects, or a stack slot whose address never
//! leaves the function.

use super::value_tracking::{decompose_pointer, is_pointer_bitcast};
use super::{AliasOracle, DataLayout, MemoryLocation};
use crate::ir::{IrFunction, IrId, IrInstruction, ValueDef, ValueUser};
use fxhash::FxHashSet;

#[derive(Debug, Clone)]
pub struct BasicAliasAnalysis {
    layout: DataLayout,
}

impl BasicAliasAnalysis {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    /// Allocas and `noalias` parameters: objects no unrelated pointer can reach
    fn is_identified_object(func: &IrFunction, base: IrId) -> bool {
        match func.value_def(base) {
            Some(ValueDef::Param(index)) => func.param(index).is_some_and(|p| p.noalias),
            Some(ValueDef::Inst(_)) => matches!(
                func.def_of(base),
                Some((_, IrInstruction::Alloca { .. }))
            ),
            _ => false,
        }
    }

    fn is_alloca(func: &IrFunction, base: IrId) -> bool {
        matches!(func.def_of(base), Some((_, IrInstruction::Alloca { .. })))
    }

    /// Whether the address of `object`, or anything derived from it, can be
    /// observed other than by loading from or storing through it
    pub fn pointer_escapes(func: &IrFunction, object: IrId) -> bool {
        let mut visited = FxHashSet::default();
        let mut worklist = vec![object];
        while let Some(value) = worklist.pop() {
            if !visited.insert(value) {
                continue;
            }
            for user in func.users(value) {
                let ValueUser::Inst(id) = user else {
                    return true;
                };
                let Some(inst) = func.inst(id) else {
                    continue;
                };
                match inst {
                    IrInstruction::Load { .. } | IrInstruction::Cmp { .. } => {}
                    IrInstruction::Store {
                        value: stored, ..
                    } => {
                        if *stored == value {
                            return true;
                        }
                    }
                    IrInstruction::GetElementPtr { dest, ptr, .. } if *ptr == value => {
                        worklist.push(*dest);
                    }
                    IrInstruction::Cast { dest, op, src, ty }
                        if is_pointer_bitcast(func, *op, *src, ty) =>
                    {
                        worklist.push(*dest);
                    }
                    _ => return true,
                }
            }
        }
        false
    }
}

impl AliasOracle for BasicAliasAnalysis {
    fn may_alias(&self, func: &IrFunction, a: &MemoryLocation, b: &MemoryLocation) -> bool {
        if a.size_bytes == 0 || b.size_bytes == 0 {
            return false;
        }
        if a.ptr == b.ptr {
            return true;
        }

        let (base_a, off_a) = decompose_pointer(func, &self.layout, a.ptr);
        let (base_b, off_b) = decompose_pointer(func, &self.layout, b.ptr);

        if base_a == base_b {
            return match (off_a, off_b) {
                (Some(oa), Some(ob)) => {
                    let (start_a, end_a) = (i128::from(oa), i128::from(oa) + i128::from(a.size_bytes));
                    let (start_b, end_b) = (i128::from(ob), i128::from(ob) + i128::from(b.size_bytes));
                    start_a < end_b && start_b < end_a
                }
                _ => true,
            };
        }

        if Self::is_identified_object(func, base_a) && Self::is_identified_object(func, base_b) {
            return false;
        }

        let local_and_private =
            |base: IrId| Self::is_alloca(func, base) && !Self::pointer_escapes(func, base);
        if local_and_private(base_a) || local_and_private(base_b) {
            return false;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, IrFunctionId, IrType, MemoryEffects};

    fn loc(ptr: IrId, size: u64) -> MemoryLocation {
        MemoryLocation::new(ptr, size)
    }

    #[test]
    fn test_same_base_offsets() {
        let aa = BasicAliasAnalysis::new(DataLayout::default());
        let mut func = IrFunction::new(IrFunctionId(0), "f", IrType::Void);
        let p = func.add_parameter("p", IrType::ptr(IrType::I32), false);
        let mut b = FunctionBuilder::new(&mut func);
        let p1 = b.build_elem_ptr(p, IrType::I32, 1).unwrap();
        let p2 = b.build_elem_ptr(p, IrType::I32, 2).unwrap();
        let i = b.build_int(5, IrType::I64).unwrap();
        let pi = b
            .build_gep(p, IrType::I32, vec![crate::ir::GepIndex::Value(i)], true)
            .unwrap();

        assert!(!aa.may_alias(&func, &loc(p1, 4), &loc(p2, 4)));
        assert!(aa.may_alias(&func, &loc(p1, 8), &loc(p2, 4)));
        assert!(!aa.may_alias(&func, &loc(p, 4), &loc(p1, 4)));
        assert!(aa.may_alias(&func, &loc(pi, 4), &loc(p1, 4)));
    }

    #[test]
    fn test_identified_objects() {
        let aa = BasicAliasAnalysis::new(DataLayout::default());
        let mut func = IrFunction::new(IrFunctionId(0), "f", IrType::Void);
        let a = func.add_parameter("a", IrType::ptr(IrType::F32), true);
        let c = func.add_parameter("c", IrType::ptr(IrType::F32), true);
        let x = func.add_parameter("x", IrType::ptr(IrType::F32), false);
        let y = func.add_parameter("y", IrType::ptr(IrType::F32), false);
        let mut b = FunctionBuilder::new(&mut func);
        let s1 = b.build_alloca(IrType::F32, 4).unwrap();
        let s2 = b.build_alloca(IrType::F32, 4).unwrap();

        assert!(!aa.may_alias(&func, &loc(a, 4), &loc(c, 4)));
        assert!(!aa.may_alias(&func, &loc(s1, 4), &loc(s2, 4)));
        assert!(!aa.may_alias(&func, &loc(s1, 4), &loc(a, 4)));
        assert!(aa.may_alias(&func, &loc(x, 4), &loc(y, 4)));
        assert!(aa.may_alias(&func, &loc(a, 4), &loc(x, 4)));
        // Neither stack slot escaped
        assert!(!aa.may_alias(&func, &loc(s1, 4), &loc(x, 4)));
    }

    #[test]
    fn test_escaping_alloca() {
        let aa = BasicAliasAnalysis::new(DataLayout::default());
        let mut func = IrFunction::new(IrFunctionId(0), "f", IrType::Void);
        let x = func.add_parameter("x", IrType::ptr(IrType::I32), false);
        let mut b = FunctionBuilder::new(&mut func);
        let slot = b.build_alloca(IrType::Array(Box::new(IrType::I32), 4), 4).unwrap();
        let elem = b
            .build_gep(
                slot,
                IrType::Array(Box::new(IrType::I32), 4),
                vec![crate::ir::GepIndex::Const(0), crate::ir::GepIndex::Const(1)],
                true,
            )
            .unwrap();
        let other = b.build_alloca(IrType::I32, 4).unwrap();
        b.build_call_void("sink", vec![elem], MemoryEffects::ReadWrite)
            .unwrap();

        assert!(BasicAliasAnalysis::pointer_escapes(&func, slot));
        assert!(!BasicAliasAnalysis::pointer_escapes(&func, other));
        assert!(aa.may_alias(&func, &loc(slot, 4), &loc(x, 4)));
        assert!(!aa.may_alias(&func, &loc(other, 4), &loc(x, 4)));
    }
}
