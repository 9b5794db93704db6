//! Live views over loads and stores

use crate::ir::analysis::LayoutOracle;
use crate::ir::{AccessMetadata, InstId, IrFunction, IrId, IrInstruction, IrType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Load,
    Store,
}

impl AccessKind {
    pub fn name(&self) -> &'static str {
        match self {
            AccessKind::Load => "load",
            AccessKind::Store => "store",
        }
    }
}

/// One load or store, read from the instruction at the time of the query
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryAccess {
    pub inst: InstId,
    pub kind: AccessKind,
    pub ptr: IrId,
    /// Type of the loaded or stored value
    pub ty: IrType,
    pub addr_space: u32,
    /// Declared alignment, 0 if unspecified
    pub align: u32,
    /// Neither atomic nor volatile
    pub simple: bool,
}

impl MemoryAccess {
    /// View of `inst` if it is a load or store with a typed pointer operand
    pub fn from_inst(func: &IrFunction, inst: InstId) -> Option<Self> {
        let (kind, ptr, ty, align, flags) = match func.inst(inst)? {
            IrInstruction::Load {
                ptr,
                ty,
                align,
                flags,
                ..
            } => (AccessKind::Load, *ptr, ty, *align, flags),
            IrInstruction::Store {
                ptr,
                ty,
                align,
                flags,
                ..
            } => (AccessKind::Store, *ptr, ty, *align, flags),
            _ => return None,
        };
        let addr_space = func.value_type(ptr)?.addr_space()?;
        Some(Self {
            inst,
            kind,
            ptr,
            ty: ty.clone(),
            addr_space,
            align,
            simple: flags.is_simple(),
        })
    }

    /// The loaded result or the stored operand
    pub fn value(&self, func: &IrFunction) -> Option<IrId> {
        match func.inst(self.inst)? {
            IrInstruction::Load { dest, .. } => Some(*dest),
            IrInstruction::Store { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn metadata<'a>(&self, func: &'a IrFunction) -> Option<&'a AccessMetadata> {
        match func.inst(self.inst)? {
            IrInstruction::Load { metadata, .. } | IrInstruction::Store { metadata, .. } => {
                Some(metadata)
            }
            _ => None,
        }
    }

    /// Declared alignment, or the ABI alignment of the accessed type
    pub fn effective_align(&self, layout: &dyn LayoutOracle) -> u32 {
        if self.align != 0 {
            self.align
        } else {
            layout.abi_align(&self.ty)
        }
    }

    pub fn store_size(&self, layout: &dyn LayoutOracle) -> u64 {
        layout.store_size_bytes(&self.ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::analysis::DataLayout;
    use crate::ir::{FunctionBuilder, IrFunctionId};

    #[test]
    fn test_access_views() {
        let mut func = IrFunction::new(IrFunctionId(0), "f", IrType::Void);
        let p = func.add_parameter("p", IrType::ptr_in(IrType::I16, 2), false);
        let mut b = FunctionBuilder::new(&mut func);
        let v = b.build_load(p, IrType::I16, 0).unwrap();
        let store = b.build_store(p, v, 2).unwrap();
        let load = func.def_inst(v).unwrap();

        let dl = DataLayout::default();
        let l = MemoryAccess::from_inst(&func, load).unwrap();
        assert_eq!(l.kind, AccessKind::Load);
        assert_eq!(l.addr_space, 2);
        assert_eq!(l.effective_align(&dl), 2);
        assert_eq!(l.value(&func), Some(v));
        assert!(l.simple);

        let s = MemoryAccess::from_inst(&func, store).unwrap();
        assert_eq!(s.kind, AccessKind::Store);
        assert_eq!(s.value(&func), Some(v));
        assert_eq!(s.store_size(&dl), 2);
    }
}
