//! IR Instructions
//!
//! Defines the instruction set for the intermediate representation.
//! Instructions are low-level operations that map directly to machine operations.

use super::{IrId, IrSourceLocation, IrType, IrValue};
use serde::{Deserialize, Serialize};

/// IR instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrInstruction {
    // === Value Operations ===
    /// Materialize a constant value of type `ty`
    Const {
        dest: IrId,
        value: IrValue,
        ty: IrType,
    },

    // === Memory Operations ===
    /// Stack allocation of one `ty`; `dest` has type `*ty`
    Alloca {
        dest: IrId,
        ty: IrType,
        align: u32,
    },

    /// Load value from memory
    Load {
        dest: IrId,
        ptr: IrId,
        ty: IrType,
        /// Byte alignment; 0 means the ABI alignment of `ty`
        align: u32,
        flags: AccessFlags,
        metadata: AccessMetadata,
    },

    /// Store value to memory
    Store {
        ptr: IrId,
        value: IrId,
        ty: IrType,
        /// Byte alignment; 0 means the ABI alignment of `ty`
        align: u32,
        flags: AccessFlags,
        metadata: AccessMetadata,
    },

    /// Get element pointer (GEP). The first index steps over whole
    /// `source_ty` objects, later indices step into aggregates.
    GetElementPtr {
        dest: IrId,
        ptr: IrId,
        source_ty: IrType,
        indices: Vec<GepIndex>,
        inbounds: bool,
    },

    // === Arithmetic Operations ===
    /// Binary arithmetic operation
    BinOp {
        dest: IrId,
        op: BinaryOp,
        left: IrId,
        right: IrId,
        wrap: WrapFlags,
    },

    /// Compare operation, produces a `Bool`
    Cmp {
        dest: IrId,
        op: CompareOp,
        left: IrId,
        right: IrId,
    },

    // === Type Operations ===
    /// Conversion of `src` to `ty`
    Cast {
        dest: IrId,
        op: CastOp,
        src: IrId,
        ty: IrType,
    },

    // === Vector Operations ===
    /// Extract one lane of a vector
    ExtractElement {
        dest: IrId,
        vector: IrId,
        index: LaneIndex,
    },

    /// Insert a scalar into one lane of a vector
    InsertElement {
        dest: IrId,
        vector: IrId,
        scalar: IrId,
        index: LaneIndex,
    },

    // === Calls ===
    /// Direct call of an external function
    Call {
        dest: Option<IrId>,
        callee: String,
        args: Vec<IrId>,
        ret_ty: IrType,
        effects: MemoryEffects,
    },
}

/// Index operand of a GEP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GepIndex {
    Const(i64),
    Value(IrId),
}

/// Lane operand of an extract/insert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LaneIndex {
    Const(u32),
    Value(IrId),
}

impl LaneIndex {
    pub fn as_const(&self) -> Option<u32> {
        match self {
            LaneIndex::Const(i) => Some(*i),
            LaneIndex::Value(_) => None,
        }
    }
}

/// Ordering constraints of a memory access
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessFlags {
    pub volatile: bool,
    pub atomic: bool,
}

impl AccessFlags {
    /// Neither atomic nor volatile
    pub fn is_simple(&self) -> bool {
        !self.volatile && !self.atomic
    }
}

/// Source-level facts attached to a load or store
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessMetadata {
    /// Type-based alias tag
    pub alias_tag: Option<u32>,
    pub nontemporal: bool,
    /// Memory is known not to change while the function runs
    pub invariant: bool,
    pub location: Option<IrSourceLocation>,
}

impl AccessMetadata {
    /// Metadata valid for an access that replaces all of `items`.
    ///
    /// Facts survive only if every item carries them. The source location of
    /// the last item is kept.
    pub fn merge<'a>(items: impl IntoIterator<Item = &'a AccessMetadata>) -> AccessMetadata {
        let mut iter = items.into_iter();
        let Some(first) = iter.next() else {
            return AccessMetadata::default();
        };
        let mut merged = first.clone();
        for item in iter {
            if merged.alias_tag != item.alias_tag {
                merged.alias_tag = None;
            }
            merged.nontemporal &= item.nontemporal;
            merged.invariant &= item.invariant;
            merged.location = item.location;
        }
        merged
    }
}

/// Overflow guarantees of an integer operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WrapFlags {
    /// No signed wrap
    pub nsw: bool,
    /// No unsigned wrap
    pub nuw: bool,
}

impl WrapFlags {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn nsw() -> Self {
        Self {
            nsw: true,
            nuw: false,
        }
    }

    pub fn nuw() -> Self {
        Self {
            nsw: false,
            nuw: true,
        }
    }
}

/// What a call may do to memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryEffects {
    None,
    ReadOnly,
    ReadWrite,
}

/// Binary operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,

    // Bitwise
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,

    // Floating point
    FAdd,
    FSub,
    FMul,
}

/// Comparison operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    // Signed
    Lt,
    Le,
    Gt,
    Ge,
    // Unsigned
    ULt,
    UGt,
}

/// Conversion operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CastOp {
    ZExt,
    SExt,
    Trunc,
    /// Reinterpret the bits of a same-sized value
    BitCast,
    PtrToInt,
    IntToPtr,
}

impl IrInstruction {
    /// Get the destination register if this instruction produces a value
    pub fn dest(&self) -> Option<IrId> {
        match self {
            IrInstruction::Const { dest, .. }
            | IrInstruction::Alloca { dest, .. }
            | IrInstruction::Load { dest, .. }
            | IrInstruction::GetElementPtr { dest, .. }
            | IrInstruction::BinOp { dest, .. }
            | IrInstruction::Cmp { dest, .. }
            | IrInstruction::Cast { dest, .. }
            | IrInstruction::ExtractElement { dest, .. }
            | IrInstruction::InsertElement { dest, .. } => Some(*dest),

            IrInstruction::Call { dest, .. } => *dest,

            IrInstruction::Store { .. } => None,
        }
    }

    /// Get all registers used by this instruction
    pub fn uses(&self) -> Vec<IrId> {
        match self {
            IrInstruction::Const { .. } | IrInstruction::Alloca { .. } => vec![],
            IrInstruction::Load { ptr, .. } => vec![*ptr],
            IrInstruction::Store { ptr, value, .. } => vec![*ptr, *value],
            IrInstruction::GetElementPtr { ptr, indices, .. } => {
                let mut uses = vec![*ptr];
                uses.extend(indices.iter().filter_map(|index| match index {
                    GepIndex::Value(id) => Some(*id),
                    GepIndex::Const(_) => None,
                }));
                uses
            }
            IrInstruction::BinOp { left, right, .. } | IrInstruction::Cmp { left, right, .. } => {
                vec![*left, *right]
            }
            IrInstruction::Cast { src, .. } => vec![*src],
            IrInstruction::ExtractElement { vector, index, .. } => {
                let mut uses = vec![*vector];
                if let LaneIndex::Value(id) = index {
                    uses.push(*id);
                }
                uses
            }
            IrInstruction::InsertElement {
                vector,
                scalar,
                index,
                ..
            } => {
                let mut uses = vec![*vector, *scalar];
                if let LaneIndex::Value(id) = index {
                    uses.push(*id);
                }
                uses
            }
            IrInstruction::Call { args, .. } => args.clone(),
        }
    }

    /// Rewrite every use of `old` into a use of `new`.
    /// Returns whether anything changed.
    pub fn replace_uses(&mut self, old: IrId, new: IrId) -> bool {
        let mut changed = false;
        let mut swap = |id: &mut IrId| {
            if *id == old {
                *id = new;
                changed = true;
            }
        };
        match self {
            IrInstruction::Const { .. } | IrInstruction::Alloca { .. } => {}
            IrInstruction::Load { ptr, .. } => swap(ptr),
            IrInstruction::Store { ptr, value, .. } => {
                swap(ptr);
                swap(value);
            }
            IrInstruction::GetElementPtr { ptr, indices, .. } => {
                swap(ptr);
                for index in indices.iter_mut() {
                    if let GepIndex::Value(id) = index {
                        swap(id);
                    }
                }
            }
            IrInstruction::BinOp { left, right, .. } | IrInstruction::Cmp { left, right, .. } => {
                swap(left);
                swap(right);
            }
            IrInstruction::Cast { src, .. } => swap(src),
            IrInstruction::ExtractElement { vector, index, .. } => {
                swap(vector);
                if let LaneIndex::Value(id) = index {
                    swap(id);
                }
            }
            IrInstruction::InsertElement {
                vector,
                scalar,
                index,
                ..
            } => {
                swap(vector);
                swap(scalar);
                if let LaneIndex::Value(id) = index {
                    swap(id);
                }
            }
            IrInstruction::Call { args, .. } => {
                for arg in args.iter_mut() {
                    swap(arg);
                }
            }
        }
        changed
    }

    pub fn is_load(&self) -> bool {
        matches!(self, IrInstruction::Load { .. })
    }

    pub fn is_store(&self) -> bool {
        matches!(self, IrInstruction::Store { .. })
    }

    /// Pointer operand of a load or store
    pub fn pointer_operand(&self) -> Option<IrId> {
        match self {
            IrInstruction::Load { ptr, .. } | IrInstruction::Store { ptr, .. } => Some(*ptr),
            _ => None,
        }
    }

    pub fn may_read_memory(&self) -> bool {
        match self {
            IrInstruction::Load { .. } => true,
            IrInstruction::Store { flags, .. } => flags.volatile,
            IrInstruction::Call { effects, .. } => *effects != MemoryEffects::None,
            _ => false,
        }
    }

    pub fn may_write_memory(&self) -> bool {
        match self {
            IrInstruction::Store { .. } => true,
            // Volatile and ordered loads may not be reordered with other accesses
            IrInstruction::Load { flags, .. } => !flags.is_simple(),
            IrInstruction::Call { effects, .. } => *effects == MemoryEffects::ReadWrite,
            _ => false,
        }
    }

    pub fn may_read_or_write_memory(&self) -> bool {
        self.may_read_memory() || self.may_write_memory()
    }

    /// Check if this instruction has side effects
    pub fn has_side_effects(&self) -> bool {
        self.may_write_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_properties() {
        let add = IrInstruction::BinOp {
            dest: IrId::new(1),
            op: BinaryOp::Add,
            left: IrId::new(2),
            right: IrId::new(3),
            wrap: WrapFlags::none(),
        };

        assert_eq!(add.dest(), Some(IrId::new(1)));
        assert_eq!(add.uses(), vec![IrId::new(2), IrId::new(3)]);
        assert!(!add.has_side_effects());

        let store = IrInstruction::Store {
            ptr: IrId::new(4),
            value: IrId::new(1),
            ty: IrType::I32,
            align: 4,
            flags: AccessFlags::default(),
            metadata: AccessMetadata::default(),
        };
        assert_eq!(store.dest(), None);
        assert!(store.has_side_effects());
        assert_eq!(store.pointer_operand(), Some(IrId::new(4)));
    }

    #[test]
    fn test_replace_uses() {
        let mut gep = IrInstruction::GetElementPtr {
            dest: IrId::new(5),
            ptr: IrId::new(1),
            source_ty: IrType::I32,
            indices: vec![GepIndex::Value(IrId::new(2)), GepIndex::Const(3)],
            inbounds: true,
        };
        assert!(gep.replace_uses(IrId::new(2), IrId::new(9)));
        assert_eq!(gep.uses(), vec![IrId::new(1), IrId::new(9)]);
        assert!(!gep.replace_uses(IrId::new(2), IrId::new(9)));
    }

    #[test]
    fn test_memory_effects() {
        let volatile_load = IrInstruction::Load {
            dest: IrId::new(1),
            ptr: IrId::new(0),
            ty: IrType::I8,
            align: 1,
            flags: AccessFlags {
                volatile: true,
                atomic: false,
            },
            metadata: AccessMetadata::default(),
        };
        assert!(volatile_load.has_side_effects());

        let pure_call = IrInstruction::Call {
            dest: None,
            callee: "sqrt".to_string(),
            args: vec![],
            ret_ty: IrType::Void,
            effects: MemoryEffects::ReadOnly,
        };
        assert!(pure_call.may_read_or_write_memory());
        assert!(!pure_call.has_side_effects());
    }

    #[test]
    fn test_metadata_merge() {
        let a = AccessMetadata {
            alias_tag: Some(3),
            nontemporal: true,
            invariant: false,
            location: Some(IrSourceLocation::new(0, 1, 1)),
        };
        let b = AccessMetadata {
            alias_tag: Some(3),
            nontemporal: false,
            invariant: false,
            location: Some(IrSourceLocation::new(0, 2, 1)),
        };
        let merged = AccessMetadata::merge([&a, &b]);
        assert_eq!(merged.alias_tag, Some(3));
        assert!(!merged.nontemporal);
        assert_eq!(merged.location, Some(IrSourceLocation::new(0, 2, 1)));

        let c = AccessMetadata {
            alias_tag: Some(4),
            ..AccessMetadata::default()
        };
        assert_eq!(AccessMetadata::merge([&a, &c]).alias_tag, None);
    }
}
