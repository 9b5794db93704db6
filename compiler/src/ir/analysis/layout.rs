//! Data layout and vector register description

use super::{LayoutOracle, VectorCostModel};
use crate::config::VectorizerConfig;
use crate::ir::IrType;
use fxhash::FxHashMap;

/// Type sizes for a target with configurable pointer widths
#[derive(Debug, Clone)]
pub struct DataLayout {
    default_pointer_bits: u32,
    pointer_bits: FxHashMap<u32, u32>,
}

impl Default for DataLayout {
    fn default() -> Self {
        Self::from_config(&VectorizerConfig::default())
    }
}

impl DataLayout {
    pub fn from_config(config: &VectorizerConfig) -> Self {
        let pointer_bits = config
            .address_spaces
            .iter()
            .filter_map(|space| space.pointer_bits.map(|bits| (space.id, bits)))
            .collect();
        Self {
            default_pointer_bits: config.default_pointer_bits,
            pointer_bits,
        }
    }

    fn struct_size_bytes(&self, fields: &[IrType]) -> u64 {
        let mut offset = 0u64;
        for field in fields {
            let align = u64::from(self.abi_align(field));
            offset = offset.div_ceil(align) * align + self.alloc_size_bytes(field);
        }
        let align = u64::from(self.abi_align_struct(fields));
        offset.div_ceil(align) * align
    }

    fn abi_align_struct(&self, fields: &[IrType]) -> u32 {
        fields.iter().map(|f| self.abi_align(f)).max().unwrap_or(1)
    }
}

impl LayoutOracle for DataLayout {
    fn type_size_bits(&self, ty: &IrType) -> u64 {
        match ty {
            IrType::Void => 0,
            IrType::Ptr { addr_space, .. } => u64::from(self.pointer_size_bits(*addr_space)),
            IrType::Array(elem, count) => self.alloc_size_bytes(elem) * 8 * (*count as u64),
            IrType::Struct { fields, .. } => self.struct_size_bytes(fields) * 8,
            IrType::Vector { element, count } => self.type_size_bits(element) * (*count as u64),
            other => u64::from(other.primitive_bits().unwrap_or(0)),
        }
    }

    fn abi_align(&self, ty: &IrType) -> u32 {
        match ty {
            IrType::Void => 1,
            IrType::Array(elem, _) => self.abi_align(elem),
            IrType::Struct { fields, .. } => self.abi_align_struct(fields),
            // Vectors are naturally aligned
            IrType::Vector { .. } => {
                let bytes = self.store_size_bytes(ty).max(1);
                bytes.next_power_of_two().min(u64::from(u32::MAX)) as u32
            }
            _ => {
                let bytes = self.store_size_bytes(ty).clamp(1, 16);
                bytes.next_power_of_two() as u32
            }
        }
    }

    fn pointer_size_bits(&self, addr_space: u32) -> u32 {
        self.pointer_bits
            .get(&addr_space)
            .copied()
            .unwrap_or(self.default_pointer_bits)
    }
}

/// Vector register widths per address space
#[derive(Debug, Clone)]
pub struct TargetVectorInfo {
    default_register_bits: u32,
    register_bits: FxHashMap<u32, u32>,
}

impl Default for TargetVectorInfo {
    fn default() -> Self {
        Self::from_config(&VectorizerConfig::default())
    }
}

impl TargetVectorInfo {
    pub fn from_config(config: &VectorizerConfig) -> Self {
        let register_bits = config
            .address_spaces
            .iter()
            .filter_map(|space| space.register_bits.map(|bits| (space.id, bits)))
            .collect();
        Self {
            default_register_bits: config.default_register_bits,
            register_bits,
        }
    }

    /// Same width in every address space
    pub fn uniform(bits: u32) -> Self {
        Self {
            default_register_bits: bits,
            register_bits: FxHashMap::default(),
        }
    }
}

impl VectorCostModel for TargetVectorInfo {
    fn register_width_bits(&self, addr_space: u32) -> u32 {
        self.register_bits
            .get(&addr_space)
            .copied()
            .unwrap_or(self.default_register_bits)
    }
}
