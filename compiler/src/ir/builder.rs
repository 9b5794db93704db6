//! IR Builder
//!
//! Provides a builder interface for constructing IR in a convenient way.
//! The builder keeps an insertion block and allocates result registers; like
//! the rest of the IR API it returns `None` when asked to build into a block
//! that does not exist.

use super::{
    AccessFlags, AccessMetadata, BinaryOp, CastOp, CompareOp, GepIndex, InstId, IrBlockId,
    IrFunction, IrId, IrInstruction, IrPhiNode, IrSourceLocation, IrTerminator, IrType, IrValue,
    LaneIndex, MemoryEffects, WrapFlags,
};

/// Builder for the body of one function
pub struct FunctionBuilder<'f> {
    func: &'f mut IrFunction,

    /// Current basic block being built
    current_block: IrBlockId,

    /// Source location attached to memory accesses
    current_source_location: Option<IrSourceLocation>,

    last_inst: Option<InstId>,
}

impl<'f> FunctionBuilder<'f> {
    /// Create a builder positioned at the end of the entry block
    pub fn new(func: &'f mut IrFunction) -> Self {
        let current_block = func.entry_block();
        Self {
            func,
            current_block,
            current_source_location: None,
            last_inst: None,
        }
    }

    pub fn function(&self) -> &IrFunction {
        self.func
    }

    /// Set the current source location for debugging
    pub fn set_source_location(&mut self, loc: IrSourceLocation) {
        self.current_source_location = Some(loc);
    }

    // === Block Management ===

    /// Create a new basic block (does not switch to it)
    pub fn create_block(&mut self) -> IrBlockId {
        self.func.cfg.create_block()
    }

    /// Create a new basic block with a label
    pub fn create_block_with_label(&mut self, label: impl Into<String>) -> IrBlockId {
        let id = self.func.cfg.create_block();
        if let Some(block) = self.func.cfg.get_block_mut(id) {
            block.label = Some(label.into());
        }
        id
    }

    /// Switch to building in a different block
    pub fn switch_to_block(&mut self, block: IrBlockId) {
        self.current_block = block;
    }

    pub fn current_block(&self) -> IrBlockId {
        self.current_block
    }

    /// Handle of the most recently built instruction
    pub fn last_inst(&self) -> Option<InstId> {
        self.last_inst
    }

    fn add_instruction(&mut self, inst: IrInstruction) -> Option<InstId> {
        let id = self.func.append_instruction(self.current_block, inst)?;
        self.last_inst = Some(id);
        Some(id)
    }

    fn metadata(&self) -> AccessMetadata {
        AccessMetadata {
            location: self.current_source_location,
            ..AccessMetadata::default()
        }
    }

    // === Constants ===

    /// Build a constant of an explicit type
    pub fn build_const(&mut self, value: IrValue, ty: IrType) -> Option<IrId> {
        let dest = self.func.alloc_reg();
        self.add_instruction(IrInstruction::Const { dest, value, ty })?;
        Some(dest)
    }

    /// Build an integer constant
    pub fn build_int(&mut self, value: i64, ty: IrType) -> Option<IrId> {
        if !ty.is_integer() {
            return None;
        }
        self.build_const(IrValue::Int(value), ty)
    }

    pub fn build_f32(&mut self, value: f32) -> Option<IrId> {
        self.build_const(IrValue::F32(value), IrType::F32)
    }

    pub fn build_f64(&mut self, value: f64) -> Option<IrId> {
        self.build_const(IrValue::F64(value), IrType::F64)
    }

    pub fn build_undef(&mut self, ty: IrType) -> Option<IrId> {
        self.build_const(IrValue::Undef, ty)
    }

    /// Build a null pointer of the given pointer type
    pub fn build_null(&mut self, ty: IrType) -> Option<IrId> {
        if !ty.is_pointer() {
            return None;
        }
        self.build_const(IrValue::Null, ty)
    }

    // === Memory ===

    /// Build a stack allocation of one `ty`
    pub fn build_alloca(&mut self, ty: IrType, align: u32) -> Option<IrId> {
        let dest = self.func.alloc_reg();
        self.add_instruction(IrInstruction::Alloca { dest, ty, align })?;
        Some(dest)
    }

    /// Build a simple load instruction
    pub fn build_load(&mut self, ptr: IrId, ty: IrType, align: u32) -> Option<IrId> {
        let metadata = self.metadata();
        self.build_load_with(ptr, ty, align, AccessFlags::default(), metadata)
    }

    pub fn build_load_with(
        &mut self,
        ptr: IrId,
        ty: IrType,
        align: u32,
        flags: AccessFlags,
        metadata: AccessMetadata,
    ) -> Option<IrId> {
        let dest = self.func.alloc_reg();
        self.add_instruction(IrInstruction::Load {
            dest,
            ptr,
            ty,
            align,
            flags,
            metadata,
        })?;
        Some(dest)
    }

    /// Build a simple store; the stored type is the value's register type
    pub fn build_store(&mut self, ptr: IrId, value: IrId, align: u32) -> Option<InstId> {
        let metadata = self.metadata();
        self.build_store_with(ptr, value, align, AccessFlags::default(), metadata)
    }

    pub fn build_store_with(
        &mut self,
        ptr: IrId,
        value: IrId,
        align: u32,
        flags: AccessFlags,
        metadata: AccessMetadata,
    ) -> Option<InstId> {
        let ty = self.func.value_type(value)?.clone();
        self.add_instruction(IrInstruction::Store {
            ptr,
            value,
            ty,
            align,
            flags,
            metadata,
        })
    }

    /// Build a get-element-pointer
    pub fn build_gep(
        &mut self,
        ptr: IrId,
        source_ty: IrType,
        indices: Vec<GepIndex>,
        inbounds: bool,
    ) -> Option<IrId> {
        let dest = self.func.alloc_reg();
        self.add_instruction(IrInstruction::GetElementPtr {
            dest,
            ptr,
            source_ty,
            indices,
            inbounds,
        })?;
        Some(dest)
    }

    /// In-bounds GEP stepping `index` elements of `elem_ty` from `ptr`
    pub fn build_elem_ptr(&mut self, ptr: IrId, elem_ty: IrType, index: i64) -> Option<IrId> {
        self.build_gep(ptr, elem_ty, vec![GepIndex::Const(index)], true)
    }

    // === Arithmetic ===

    /// Build a binary operation without wrap flags
    pub fn build_binop(&mut self, op: BinaryOp, left: IrId, right: IrId) -> Option<IrId> {
        self.build_binop_with_flags(op, left, right, WrapFlags::none())
    }

    pub fn build_binop_with_flags(
        &mut self,
        op: BinaryOp,
        left: IrId,
        right: IrId,
        wrap: WrapFlags,
    ) -> Option<IrId> {
        let dest = self.func.alloc_reg();
        self.add_instruction(IrInstruction::BinOp {
            dest,
            op,
            left,
            right,
            wrap,
        })?;
        Some(dest)
    }

    /// Build a comparison operation
    pub fn build_cmp(&mut self, op: CompareOp, left: IrId, right: IrId) -> Option<IrId> {
        let dest = self.func.alloc_reg();
        self.add_instruction(IrInstruction::Cmp {
            dest,
            op,
            left,
            right,
        })?;
        Some(dest)
    }

    /// Build a type conversion
    pub fn build_cast(&mut self, op: CastOp, src: IrId, ty: IrType) -> Option<IrId> {
        let dest = self.func.alloc_reg();
        self.add_instruction(IrInstruction::Cast { dest, op, src, ty })?;
        Some(dest)
    }

    pub fn build_bitcast(&mut self, src: IrId, ty: IrType) -> Option<IrId> {
        self.build_cast(CastOp::BitCast, src, ty)
    }

    // === Vectors ===

    pub fn build_extract_element(&mut self, vector: IrId, lane: u32) -> Option<IrId> {
        let dest = self.func.alloc_reg();
        self.add_instruction(IrInstruction::ExtractElement {
            dest,
            vector,
            index: LaneIndex::Const(lane),
        })?;
        Some(dest)
    }

    pub fn build_insert_element(&mut self, vector: IrId, scalar: IrId, lane: u32) -> Option<IrId> {
        let dest = self.func.alloc_reg();
        self.add_instruction(IrInstruction::InsertElement {
            dest,
            vector,
            scalar,
            index: LaneIndex::Const(lane),
        })?;
        Some(dest)
    }

    // === Calls ===

    /// Build a call returning a value
    pub fn build_call(
        &mut self,
        callee: impl Into<String>,
        args: Vec<IrId>,
        ret_ty: IrType,
        effects: MemoryEffects,
    ) -> Option<IrId> {
        if ret_ty == IrType::Void {
            return None;
        }
        let dest = self.func.alloc_reg();
        self.add_instruction(IrInstruction::Call {
            dest: Some(dest),
            callee: callee.into(),
            args,
            ret_ty,
            effects,
        })?;
        Some(dest)
    }

    /// Build a call without a result
    pub fn build_call_void(
        &mut self,
        callee: impl Into<String>,
        args: Vec<IrId>,
        effects: MemoryEffects,
    ) -> Option<InstId> {
        self.add_instruction(IrInstruction::Call {
            dest: None,
            callee: callee.into(),
            args,
            ret_ty: IrType::Void,
            effects,
        })
    }

    // === Terminators ===

    fn set_terminator(&mut self, term: IrTerminator) -> Option<()> {
        let block = self.func.cfg.get_block_mut(self.current_block)?;
        block.set_terminator(term);
        Some(())
    }

    /// Build an unconditional branch
    pub fn build_branch(&mut self, target: IrBlockId) -> Option<()> {
        self.set_terminator(IrTerminator::Branch { target })
    }

    /// Build a conditional branch
    pub fn build_cond_branch(
        &mut self,
        condition: IrId,
        true_target: IrBlockId,
        false_target: IrBlockId,
    ) -> Option<()> {
        self.set_terminator(IrTerminator::CondBranch {
            condition,
            true_target,
            false_target,
        })
    }

    /// Build a return instruction
    pub fn build_return(&mut self, value: Option<IrId>) -> Option<()> {
        self.set_terminator(IrTerminator::Return { value })
    }

    /// Build an unreachable terminator
    pub fn build_unreachable(&mut self) -> Option<()> {
        self.set_terminator(IrTerminator::Unreachable)
    }

    // === Phi Node Building ===

    /// Add a phi node to a block
    pub fn build_phi(&mut self, block: IrBlockId, ty: IrType) -> Option<IrId> {
        let dest = self.func.alloc_reg();
        let phi = IrPhiNode {
            dest,
            incoming: Vec::new(),
            ty,
        };
        self.func.add_phi(block, phi).then_some(dest)
    }

    /// Add an incoming value to a phi node
    pub fn add_phi_incoming(
        &mut self,
        block: IrBlockId,
        phi_dest: IrId,
        from_block: IrBlockId,
        value: IrId,
    ) -> Option<()> {
        self.func
            .cfg
            .get_block_mut(block)
            .and_then(|b| b.phi_nodes.iter_mut().find(|p| p.dest == phi_dest))
            .map(|phi| phi.incoming.push((from_block, value)))
    }
}
