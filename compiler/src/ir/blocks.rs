//! IR Basic Blocks
//!
//! Basic blocks are sequences of instructions with a single entry point and
//! single exit point. A block does not own its instructions: it holds the
//! ordered [`InstId`] handles of the function arena, so instructions can be
//! moved between positions without being copied.

use super::{InstId, IrId, IrSourceLocation, IrType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A basic block in the IR
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrBasicBlock {
    /// Unique identifier for this block
    pub id: IrBlockId,

    /// Human-readable label (for debugging)
    pub label: Option<String>,

    /// Instructions in this block (executed sequentially)
    pub instructions: Vec<InstId>,

    /// Terminator instruction (branch, return, etc.)
    pub terminator: IrTerminator,

    /// Phi nodes at the beginning of this block
    pub phi_nodes: Vec<IrPhiNode>,

    /// Source location for debugging
    pub source_location: IrSourceLocation,
}

/// Unique identifier for basic blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IrBlockId(pub u32);

impl IrBlockId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn entry() -> Self {
        Self(0)
    }

    pub fn is_entry(&self) -> bool {
        self.0 == 0
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for IrBlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Phi node for merging values from different control flow paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrPhiNode {
    /// Destination register for the phi result
    pub dest: IrId,

    /// Incoming values from predecessor blocks
    pub incoming: Vec<(IrBlockId, IrId)>,

    /// Type of the phi node
    pub ty: IrType,
}

/// Terminator instructions that end a basic block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IrTerminator {
    /// Unconditional branch to another block
    Branch { target: IrBlockId },

    /// Conditional branch based on a boolean value
    CondBranch {
        condition: IrId,
        true_target: IrBlockId,
        false_target: IrBlockId,
    },

    /// Return from function
    Return { value: Option<IrId> },

    /// Unreachable code (also the state of a block under construction)
    Unreachable,
}

impl IrTerminator {
    /// Registers read by the terminator
    pub fn uses(&self) -> Vec<IrId> {
        match self {
            IrTerminator::CondBranch { condition, .. } => vec![*condition],
            IrTerminator::Return { value: Some(v) } => vec![*v],
            _ => vec![],
        }
    }

    pub fn replace_uses(&mut self, old: IrId, new: IrId) -> bool {
        match self {
            IrTerminator::CondBranch { condition, .. } if *condition == old => {
                *condition = new;
                true
            }
            IrTerminator::Return { value: Some(v) } if *v == old => {
                *v = new;
                true
            }
            _ => false,
        }
    }
}

impl IrBasicBlock {
    /// Create a new basic block
    pub fn new(id: IrBlockId) -> Self {
        Self {
            id,
            label: None,
            instructions: Vec::new(),
            terminator: IrTerminator::Unreachable,
            phi_nodes: Vec::new(),
            source_location: IrSourceLocation::unknown(),
        }
    }

    /// Add a phi node to this block
    pub fn add_phi(&mut self, phi: IrPhiNode) {
        self.phi_nodes.push(phi);
    }

    /// Set the terminator for this block
    pub fn set_terminator(&mut self, term: IrTerminator) {
        self.terminator = term;
    }

    /// Get all successor blocks based on the terminator
    pub fn successors(&self) -> Vec<IrBlockId> {
        match &self.terminator {
            IrTerminator::Branch { target } => vec![*target],
            IrTerminator::CondBranch {
                true_target,
                false_target,
                ..
            } => {
                vec![*true_target, *false_target]
            }
            IrTerminator::Return { .. } | IrTerminator::Unreachable => Vec::new(),
        }
    }

    /// Position of an instruction inside this block
    pub fn position_of(&self, inst: InstId) -> Option<usize> {
        self.instructions.iter().position(|&i| i == inst)
    }
}

/// Control flow graph of one function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrControlFlowGraph {
    /// All basic blocks in the function
    pub blocks: HashMap<IrBlockId, IrBasicBlock>,

    /// Entry block ID
    pub entry_block: IrBlockId,

    /// Next available block ID
    pub next_block_id: u32,
}

impl Default for IrControlFlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl IrControlFlowGraph {
    /// Create a new CFG with an entry block
    pub fn new() -> Self {
        let mut blocks = HashMap::new();
        let entry_block = IrBlockId::entry();
        blocks.insert(entry_block, IrBasicBlock::new(entry_block));

        Self {
            blocks,
            entry_block,
            next_block_id: 1,
        }
    }

    /// Create a new basic block
    pub fn create_block(&mut self) -> IrBlockId {
        let id = IrBlockId::new(self.next_block_id);
        self.next_block_id += 1;
        self.blocks.insert(id, IrBasicBlock::new(id));
        id
    }

    /// Get a block by ID
    pub fn get_block(&self, id: IrBlockId) -> Option<&IrBasicBlock> {
        self.blocks.get(&id)
    }

    /// Get a mutable block by ID
    pub fn get_block_mut(&mut self, id: IrBlockId) -> Option<&mut IrBasicBlock> {
        self.blocks.get_mut(&id)
    }

    /// Predecessor lists derived from the terminators.
    /// Every block has an entry, possibly empty.
    pub fn predecessors(&self) -> HashMap<IrBlockId, Vec<IrBlockId>> {
        let mut preds: HashMap<IrBlockId, Vec<IrBlockId>> =
            self.blocks.keys().map(|&id| (id, Vec::new())).collect();
        let mut ids: Vec<_> = self.blocks.keys().copied().collect();
        ids.sort();
        for id in ids {
            for succ in self.blocks[&id].successors() {
                let list = preds.entry(succ).or_default();
                if !list.contains(&id) {
                    list.push(id);
                }
            }
        }
        preds
    }

    /// Verify CFG integrity
    pub fn verify(&self) -> Result<(), String> {
        if !self.blocks.contains_key(&self.entry_block) {
            return Err("Entry block not found".to_string());
        }

        let preds = self.predecessors();
        for (id, block) in &self.blocks {
            for succ in block.successors() {
                if !self.blocks.contains_key(&succ) {
                    return Err(format!(
                        "Block {} references non-existent successor {}",
                        id, succ
                    ));
                }
            }

            for phi in &block.phi_nodes {
                for (pred_block, _) in &phi.incoming {
                    let is_pred = preds.get(id).is_some_and(|p| p.contains(pred_block));
                    if !is_pred {
                        return Err(format!(
                            "Phi node in block {} references non-predecessor block {}",
                            id, pred_block
                        ));
                    }
                }
            }
        }

        Ok(())
    }
}
