//! IR Functions
//!
//! A function owns its control flow graph and an instruction arena. Blocks
//! list [`InstId`] handles in program order; the arena maps each handle to the
//! instruction and the block that currently holds it. Erased slots stay empty
//! so handles are never reused.

use super::{
    GepIndex, InstId, IrBasicBlock, IrBlockId, IrControlFlowGraph, IrId, IrInstruction,
    IrPhiNode, IrSourceLocation, IrType,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// IR function representation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrFunction {
    /// Unique identifier for this function
    pub id: IrFunctionId,

    /// Function name
    pub name: String,

    /// Function signature
    pub signature: IrFunctionSignature,

    /// Control flow graph (function body)
    pub cfg: IrControlFlowGraph,

    /// Type information for all registers (parameters, phis and instruction results)
    pub register_types: HashMap<IrId, IrType>,

    /// Function attributes
    pub attributes: FunctionAttributes,

    /// Source location for debugging
    pub source_location: IrSourceLocation,

    /// Next available register ID
    pub next_reg_id: u32,

    insts: Vec<Option<InstNode>>,

    defs: HashMap<IrId, ValueDef>,
}

/// Arena slot of a live instruction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstNode {
    pub inst: IrInstruction,
    pub block: IrBlockId,
}

/// Where an SSA value is defined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueDef {
    /// Function parameter at this index
    Param(usize),
    /// Result of an instruction
    Inst(InstId),
    /// Phi node at the head of this block
    Phi(IrBlockId),
}

/// A consumer of an SSA value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueUser {
    Inst(InstId),
    Phi(IrBlockId),
    Terminator(IrBlockId),
}

/// Unique identifier for functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IrFunctionId(pub u32);

impl std::fmt::Display for IrFunctionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fn{}", self.0)
    }
}

/// Function signature
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IrFunctionSignature {
    /// Parameter types and names
    pub parameters: Vec<IrParameter>,

    /// Return type
    pub return_type: IrType,
}

/// Function parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrParameter {
    /// Parameter name
    pub name: String,

    /// Parameter type
    pub ty: IrType,

    /// Register assigned to this parameter
    pub reg: IrId,

    /// The pointee is not accessed through any other pointer while the function runs
    pub noalias: bool,
}

/// Function attributes and metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionAttributes {
    /// Code generation must not introduce floating point or vector registers
    pub no_implicit_float: bool,

    /// Whether this function should be optimized for size
    pub optimize_size: bool,
}

impl IrFunction {
    /// Create a new function with an empty entry block
    pub fn new(id: IrFunctionId, name: impl Into<String>, return_type: IrType) -> Self {
        Self {
            id,
            name: name.into(),
            signature: IrFunctionSignature {
                parameters: Vec::new(),
                return_type,
            },
            cfg: IrControlFlowGraph::new(),
            register_types: HashMap::new(),
            attributes: FunctionAttributes::default(),
            source_location: IrSourceLocation::unknown(),
            next_reg_id: 0,
            insts: Vec::new(),
            defs: HashMap::new(),
        }
    }

    /// Append a parameter and return its register
    pub fn add_parameter(&mut self, name: impl Into<String>, ty: IrType, noalias: bool) -> IrId {
        let reg = self.alloc_reg();
        let index = self.signature.parameters.len();
        self.register_types.insert(reg, ty.clone());
        self.defs.insert(reg, ValueDef::Param(index));
        self.signature.parameters.push(IrParameter {
            name: name.into(),
            ty,
            reg,
            noalias,
        });
        reg
    }

    /// Allocate a new register
    pub fn alloc_reg(&mut self) -> IrId {
        let id = IrId::new(self.next_reg_id);
        self.next_reg_id += 1;
        id
    }

    /// Get the entry block
    pub fn entry_block(&self) -> IrBlockId {
        self.cfg.entry_block
    }

    /// Get parameter register by index
    pub fn get_param_reg(&self, index: usize) -> Option<IrId> {
        self.signature.parameters.get(index).map(|p| p.reg)
    }

    pub fn param(&self, index: usize) -> Option<&IrParameter> {
        self.signature.parameters.get(index)
    }

    // === Arena access ===

    /// Live instruction behind a handle
    pub fn inst(&self, id: InstId) -> Option<&IrInstruction> {
        self.node(id).map(|n| &n.inst)
    }

    pub fn inst_mut(&mut self, id: InstId) -> Option<&mut IrInstruction> {
        self.insts
            .get_mut(id.index())
            .and_then(|slot| slot.as_mut())
            .map(|n| &mut n.inst)
    }

    fn node(&self, id: InstId) -> Option<&InstNode> {
        self.insts.get(id.index()).and_then(|slot| slot.as_ref())
    }

    /// Block currently holding an instruction
    pub fn block_of(&self, id: InstId) -> Option<IrBlockId> {
        self.node(id).map(|n| n.block)
    }

    /// Instruction handles of a block in program order
    pub fn block_instructions(&self, block: IrBlockId) -> &[InstId] {
        self.cfg
            .get_block(block)
            .map(|b| b.instructions.as_slice())
            .unwrap_or(&[])
    }

    /// Index of an instruction inside its block
    pub fn position(&self, id: InstId) -> Option<usize> {
        let block = self.block_of(id)?;
        self.cfg.get_block(block)?.position_of(id)
    }

    /// All live instructions in arena order
    pub fn instructions(&self) -> impl Iterator<Item = (InstId, &IrInstruction)> + '_ {
        self.insts
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|n| (InstId(i as u32), &n.inst)))
    }

    pub fn instruction_count(&self) -> usize {
        self.insts.iter().filter(|slot| slot.is_some()).count()
    }

    /// Definition site of a value
    pub fn value_def(&self, value: IrId) -> Option<ValueDef> {
        self.defs.get(&value).copied()
    }

    /// Instruction defining a value, if it is instruction-defined
    pub fn def_inst(&self, value: IrId) -> Option<InstId> {
        match self.value_def(value)? {
            ValueDef::Inst(id) => Some(id),
            _ => None,
        }
    }

    /// Instruction defining a value, looked up together with the instruction
    pub fn def_of(&self, value: IrId) -> Option<(InstId, &IrInstruction)> {
        let id = self.def_inst(value)?;
        self.inst(id).map(|inst| (id, inst))
    }

    pub fn value_type(&self, value: IrId) -> Option<&IrType> {
        self.register_types.get(&value)
    }

    // === Mutation ===

    /// Append an instruction at the end of a block
    pub fn append_instruction(&mut self, block: IrBlockId, inst: IrInstruction) -> Option<InstId> {
        self.cfg.get_block(block)?;
        let id = self.register(block, inst);
        self.cfg.get_block_mut(block)?.instructions.push(id);
        Some(id)
    }

    /// Insert an instruction immediately after `anchor`
    pub fn insert_after(&mut self, anchor: InstId, inst: IrInstruction) -> Option<InstId> {
        let block = self.block_of(anchor)?;
        let pos = self.position(anchor)?;
        let id = self.register(block, inst);
        self.cfg
            .get_block_mut(block)?
            .instructions
            .insert(pos + 1, id);
        Some(id)
    }

    /// Insert an instruction immediately before `anchor`
    pub fn insert_before(&mut self, anchor: InstId, inst: IrInstruction) -> Option<InstId> {
        let block = self.block_of(anchor)?;
        let pos = self.position(anchor)?;
        let id = self.register(block, inst);
        self.cfg.get_block_mut(block)?.instructions.insert(pos, id);
        Some(id)
    }

    /// Move `inst` so it directly follows `anchor`, possibly across blocks.
    /// Returns false if either handle is dead or they are the same.
    pub fn move_after(&mut self, inst: InstId, anchor: InstId) -> bool {
        if inst == anchor {
            return false;
        }
        let (Some(from_block), Some(to_block)) = (self.block_of(inst), self.block_of(anchor))
        else {
            return false;
        };
        if let Some(block) = self.cfg.get_block_mut(from_block) {
            block.instructions.retain(|&i| i != inst);
        }
        let Some(pos) = self.position(anchor) else {
            return false;
        };
        if let Some(block) = self.cfg.get_block_mut(to_block) {
            block.instructions.insert(pos + 1, inst);
        }
        if let Some(Some(node)) = self.insts.get_mut(inst.index()) {
            node.block = to_block;
        }
        true
    }

    /// Remove an instruction from its block and the arena.
    /// The caller is responsible for the instruction's result having no uses.
    pub fn erase_instruction(&mut self, id: InstId) -> Option<IrInstruction> {
        let node = self.insts.get_mut(id.index())?.take()?;
        if let Some(block) = self.cfg.get_block_mut(node.block) {
            block.instructions.retain(|&i| i != id);
        }
        if let Some(dest) = node.inst.dest() {
            self.defs.remove(&dest);
            self.register_types.remove(&dest);
        }
        Some(node.inst)
    }

    /// Add a phi node at the head of a block
    pub fn add_phi(&mut self, block: IrBlockId, phi: IrPhiNode) -> bool {
        let dest = phi.dest;
        let ty = phi.ty.clone();
        let Some(b) = self.cfg.get_block_mut(block) else {
            return false;
        };
        b.add_phi(phi);
        self.defs.insert(dest, ValueDef::Phi(block));
        self.register_types.insert(dest, ty);
        true
    }

    fn register(&mut self, block: IrBlockId, inst: IrInstruction) -> InstId {
        let id = InstId(self.insts.len() as u32);
        if let Some(dest) = inst.dest() {
            if let Some(ty) = self.result_type(&inst) {
                self.register_types.insert(dest, ty);
            }
            self.defs.insert(dest, ValueDef::Inst(id));
            if dest.as_u32() >= self.next_reg_id {
                self.next_reg_id = dest.as_u32() + 1;
            }
        }
        self.insts.push(Some(InstNode { inst, block }));
        id
    }

    /// Type of the value an instruction produces
    pub fn result_type(&self, inst: &IrInstruction) -> Option<IrType> {
        match inst {
            IrInstruction::Const { ty, .. } => Some(ty.clone()),
            IrInstruction::Alloca { ty, .. } => Some(IrType::ptr(ty.clone())),
            IrInstruction::Load { ty, .. } => Some(ty.clone()),
            IrInstruction::Store { .. } => None,
            IrInstruction::GetElementPtr {
                ptr,
                source_ty,
                indices,
                ..
            } => {
                let space = self.value_type(*ptr)?.addr_space()?;
                let elem = gep_result_element_type(source_ty, indices)?;
                Some(IrType::ptr_in(elem, space))
            }
            IrInstruction::BinOp { left, .. } => self.value_type(*left).cloned(),
            IrInstruction::Cmp { .. } => Some(IrType::Bool),
            IrInstruction::Cast { ty, .. } => Some(ty.clone()),
            IrInstruction::ExtractElement { vector, .. } => {
                self.value_type(*vector)?.vector_element().cloned()
            }
            IrInstruction::InsertElement { vector, .. } => self.value_type(*vector).cloned(),
            IrInstruction::Call { dest, ret_ty, .. } => dest.map(|_| ret_ty.clone()),
        }
    }

    // === Use lists ===

    /// Every consumer of a value, instructions in arena order first
    pub fn users(&self, value: IrId) -> Vec<ValueUser> {
        let mut users: Vec<ValueUser> = self
            .instructions()
            .filter(|(_, inst)| inst.uses().contains(&value))
            .map(|(id, _)| ValueUser::Inst(id))
            .collect();

        let mut block_ids: Vec<_> = self.cfg.blocks.keys().copied().collect();
        block_ids.sort();
        for block_id in block_ids {
            let block = &self.cfg.blocks[&block_id];
            if block
                .phi_nodes
                .iter()
                .any(|phi| phi.incoming.iter().any(|(_, v)| *v == value))
            {
                users.push(ValueUser::Phi(block_id));
            }
            if block.terminator.uses().contains(&value) {
                users.push(ValueUser::Terminator(block_id));
            }
        }
        users
    }

    pub fn has_uses(&self, value: IrId) -> bool {
        !self.users(value).is_empty()
    }

    /// Rewrite every use of `old` into `new`. Returns the number of rewritten users.
    pub fn replace_all_uses(&mut self, old: IrId, new: IrId) -> usize {
        let mut count = 0;
        for node in self.insts.iter_mut().flatten() {
            if node.inst.replace_uses(old, new) {
                count += 1;
            }
        }
        for block in self.cfg.blocks.values_mut() {
            for phi in &mut block.phi_nodes {
                for (_, v) in &mut phi.incoming {
                    if *v == old {
                        *v = new;
                        count += 1;
                    }
                }
            }
            if block.terminator.replace_uses(old, new) {
                count += 1;
            }
        }
        count
    }

    /// Verify function integrity
    pub fn verify(&self) -> Result<(), String> {
        self.cfg.verify()?;

        if let Some(entry) = self.cfg.get_block(self.cfg.entry_block) {
            if !entry.phi_nodes.is_empty() {
                return Err("Entry block cannot have phi nodes".to_string());
            }
        }

        for (block_id, block) in &self.cfg.blocks {
            for &id in &block.instructions {
                match self.block_of(id) {
                    Some(b) if b == *block_id => {}
                    _ => return Err(format!("Instruction {} is not owned by {}", id, block_id)),
                }
            }
        }

        for (id, inst) in self.instructions() {
            for used in inst.uses() {
                let def = match self.value_def(used) {
                    Some(ValueDef::Inst(def)) => def,
                    Some(_) => continue,
                    None => {
                        return Err(format!("Instruction {} uses undefined value {}", id, used))
                    }
                };
                if self.block_of(def) == self.block_of(id) && self.position(def) > self.position(id)
                {
                    return Err(format!("Instruction {} uses {} before its definition", id, used));
                }
            }
        }

        Ok(())
    }

    /// Compute statistics for this function
    pub fn compute_stats(&self) -> FunctionStats {
        FunctionStats {
            block_count: self.cfg.blocks.len(),
            instruction_count: self.instruction_count(),
            phi_count: self
                .cfg
                .blocks
                .values()
                .map(|b: &IrBasicBlock| b.phi_nodes.len())
                .sum(),
        }
    }
}

/// Element type a GEP points at after applying its indices
pub fn gep_result_element_type(source_ty: &IrType, indices: &[GepIndex]) -> Option<IrType> {
    let mut ty = source_ty;
    for index in indices.iter().skip(1) {
        let constant = match index {
            GepIndex::Const(c) => Some(*c),
            GepIndex::Value(_) => None,
        };
        ty = ty.element_at(constant)?;
    }
    Some(ty.clone())
}

/// Function statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FunctionStats {
    /// Number of basic blocks
    pub block_count: usize,

    /// Number of instructions
    pub instruction_count: usize,

    /// Number of phi nodes
    pub phi_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AccessFlags, AccessMetadata, BinaryOp, IrTerminator, IrValue, WrapFlags};

    fn constant(f: &mut IrFunction, block: IrBlockId, v: i64) -> (InstId, IrId) {
        let dest = f.alloc_reg();
        let id = f
            .append_instruction(
                block,
                IrInstruction::Const {
                    dest,
                    value: IrValue::Int(v),
                    ty: IrType::I32,
                },
            )
            .unwrap();
        (id, dest)
    }

    #[test]
    fn test_parameters_are_typed_and_defined() {
        let mut f = IrFunction::new(IrFunctionId(0), "f", IrType::Void);
        let p = f.add_parameter("p", IrType::ptr(IrType::I32), true);
        assert_eq!(f.value_def(p), Some(ValueDef::Param(0)));
        assert_eq!(f.value_type(p), Some(&IrType::ptr(IrType::I32)));
        assert!(f.param(0).unwrap().noalias);
    }

    #[test]
    fn test_insert_move_erase() {
        let mut f = IrFunction::new(IrFunctionId(0), "f", IrType::Void);
        let entry = f.entry_block();
        let (a, _) = constant(&mut f, entry, 1);
        let (b, _) = constant(&mut f, entry, 2);
        let dest = f.alloc_reg();
        let c = f
            .insert_after(
                a,
                IrInstruction::Const {
                    dest,
                    value: IrValue::Int(3),
                    ty: IrType::I32,
                },
            )
            .unwrap();
        assert_eq!(f.block_instructions(entry), &[a, c, b]);

        assert!(f.move_after(a, b));
        assert_eq!(f.block_instructions(entry), &[c, b, a]);
        assert_eq!(f.position(a), Some(2));

        f.erase_instruction(c).unwrap();
        assert_eq!(f.block_instructions(entry), &[b, a]);
        assert!(f.inst(c).is_none());
        assert!(f.value_def(dest).is_none());
    }

    #[test]
    fn test_users_and_replace_all_uses() {
        let mut f = IrFunction::new(IrFunctionId(0), "f", IrType::I32);
        let entry = f.entry_block();
        let (_, x) = constant(&mut f, entry, 1);
        let (_, y) = constant(&mut f, entry, 2);
        let sum = f.alloc_reg();
        let add = f
            .append_instruction(
                entry,
                IrInstruction::BinOp {
                    dest: sum,
                    op: BinaryOp::Add,
                    left: x,
                    right: x,
                    wrap: WrapFlags::none(),
                },
            )
            .unwrap();
        f.cfg
            .get_block_mut(entry)
            .unwrap()
            .set_terminator(IrTerminator::Return { value: Some(x) });

        assert_eq!(
            f.users(x),
            vec![ValueUser::Inst(add), ValueUser::Terminator(entry)]
        );
        assert_eq!(f.value_type(sum), Some(&IrType::I32));

        assert_eq!(f.replace_all_uses(x, y), 2);
        assert!(!f.has_uses(x));
        assert!(f.verify().is_ok());
    }

    #[test]
    fn test_gep_result_type() {
        let mut f = IrFunction::new(IrFunctionId(0), "f", IrType::Void);
        let entry = f.entry_block();
        let pair = IrType::Struct {
            name: "pair".into(),
            fields: vec![IrType::I32, IrType::F64],
        };
        let p = f.add_parameter("p", IrType::ptr_in(pair.clone(), 2), false);
        let dest = f.alloc_reg();
        f.append_instruction(
            entry,
            IrInstruction::GetElementPtr {
                dest,
                ptr: p,
                source_ty: pair,
                indices: vec![GepIndex::Const(0), GepIndex::Const(1)],
                inbounds: true,
            },
        )
        .unwrap();
        assert_eq!(f.value_type(dest), Some(&IrType::ptr_in(IrType::F64, 2)));

        let l = f.alloc_reg();
        f.append_instruction(
            entry,
            IrInstruction::Load {
                dest: l,
                ptr: dest,
                ty: IrType::F64,
                align: 8,
                flags: AccessFlags::default(),
                metadata: AccessMetadata::default(),
            },
        )
        .unwrap();
        assert_eq!(f.compute_stats().instruction_count, 2);
    }
}
