//! Analyses consumed by the vectorizer
//!
//! The vectorizer only talks to the facts it needs through the traits in this
//! module. Each trait has a default implementation here, so a function can be
//! vectorized stand-alone with [`DefaultAnalyses`], while a host compiler can
//! plug in its own alias analysis or target description through
//! [`AnalysisContext`].
//!
//! Oracles receive the function on every query: the vectorizer mutates the
//! IR between queries and the answers must reflect the live state.

pub mod alias;
pub mod layout;
pub mod symbolic;
pub mod value_tracking;

pub use alias::BasicAliasAnalysis;
pub use layout::{DataLayout, TargetVectorInfo};
pub use symbolic::{SymExpr, SymbolicAnalysis};

use super::dominance::DominatorTree;
use super::{InstId, IrFunction, IrId, IrType};
use crate::config::VectorizerConfig;

/// A pointer together with the number of bytes accessed through it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryLocation {
    pub ptr: IrId,
    pub size_bytes: u64,
}

impl MemoryLocation {
    pub fn new(ptr: IrId, size_bytes: u64) -> Self {
        Self { ptr, size_bytes }
    }
}

/// May two memory locations overlap?
pub trait AliasOracle {
    /// `false` only if the locations are proven disjoint
    fn may_alias(&self, func: &IrFunction, a: &MemoryLocation, b: &MemoryLocation) -> bool;
}

/// Instruction-level dominance
pub trait DominanceOracle {
    /// Whether `def` dominates `user`. An instruction does not dominate itself.
    fn dominates(&self, func: &IrFunction, def: InstId, user: InstId) -> bool;
}

/// Symbolic value equivalence and bit facts
pub trait SymbolicAddressOracle {
    /// Canonical symbolic form of a value; equal forms mean equal values
    fn symbolic(&self, func: &IrFunction, value: IrId) -> SymExpr;

    /// Mask of bits known to be zero in `value` (bit 0 is the least significant)
    fn known_zero_bits(&self, func: &IrFunction, value: IrId) -> u64;
}

/// Sizes and alignments of types
pub trait LayoutOracle {
    fn type_size_bits(&self, ty: &IrType) -> u64;

    /// Bytes written by a store of `ty`
    fn store_size_bytes(&self, ty: &IrType) -> u64 {
        self.type_size_bits(ty).div_ceil(8)
    }

    /// ABI alignment in bytes
    fn abi_align(&self, ty: &IrType) -> u32;

    fn pointer_size_bits(&self, addr_space: u32) -> u32;

    /// Distance in bytes between consecutive array elements of `ty`
    fn alloc_size_bytes(&self, ty: &IrType) -> u64 {
        let align = u64::from(self.abi_align(ty).max(1));
        self.store_size_bytes(ty).div_ceil(align) * align
    }

    /// Byte offset of field `index` inside a struct with `fields`
    fn struct_field_offset(&self, fields: &[IrType], index: usize) -> Option<u64> {
        if index >= fields.len() {
            return None;
        }
        let mut offset = 0u64;
        for (i, field) in fields.iter().enumerate() {
            let align = u64::from(self.abi_align(field).max(1));
            offset = offset.div_ceil(align) * align;
            if i == index {
                return Some(offset);
            }
            offset += self.alloc_size_bytes(field);
        }
        None
    }
}

/// Target vector register facts
pub trait VectorCostModel {
    /// Widest vector load/store in bits for an address space
    fn register_width_bits(&self, addr_space: u32) -> u32;
}

/// The oracles one vectorizer run consults
#[derive(Clone, Copy)]
pub struct AnalysisContext<'a> {
    pub alias: &'a dyn AliasOracle,
    pub dominance: &'a dyn DominanceOracle,
    pub symbolic: &'a dyn SymbolicAddressOracle,
    pub layout: &'a dyn LayoutOracle,
    pub target: &'a dyn VectorCostModel,
}

/// Instruction dominance derived from the block dominator tree plus the
/// current order of instructions inside each block
pub struct InstructionDominance {
    tree: DominatorTree,
}

impl InstructionDominance {
    pub fn compute(func: &IrFunction) -> Self {
        Self {
            tree: DominatorTree::compute(func),
        }
    }

    pub fn tree(&self) -> &DominatorTree {
        &self.tree
    }
}

impl DominanceOracle for InstructionDominance {
    fn dominates(&self, func: &IrFunction, def: InstId, user: InstId) -> bool {
        if def == user {
            return false;
        }
        let (Some(def_block), Some(user_block)) = (func.block_of(def), func.block_of(user))
        else {
            return false;
        };
        if def_block == user_block {
            return match (func.position(def), func.position(user)) {
                (Some(d), Some(u)) => d < u,
                _ => false,
            };
        }
        self.tree.dominates(def_block, user_block)
    }
}

/// Default implementations of every oracle for one function
pub struct DefaultAnalyses {
    pub alias: BasicAliasAnalysis,
    pub dominance: InstructionDominance,
    pub symbolic: SymbolicAnalysis,
    pub layout: DataLayout,
    pub target: TargetVectorInfo,
}

impl DefaultAnalyses {
    pub fn compute(func: &IrFunction, config: &VectorizerConfig) -> Self {
        let layout = DataLayout::from_config(config);
        Self {
            alias: BasicAliasAnalysis::new(layout.clone()),
            dominance: InstructionDominance::compute(func),
            symbolic: SymbolicAnalysis::new(layout.clone()),
            layout,
            target: TargetVectorInfo::from_config(config),
        }
    }

    pub fn context(&self) -> AnalysisContext<'_> {
        AnalysisContext {
            alias: &self.alias,
            dominance: &self.dominance,
            symbolic: &self.symbolic,
            layout: &self.layout,
            target: &self.target,
        }
    }
}
