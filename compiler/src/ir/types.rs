//! IR Type System
//!
//! Defines the type system for the intermediate representation. Sizes and
//! alignments are not a property of the types themselves: they come from a
//! [`LayoutOracle`](super::analysis::LayoutOracle), so one IR can be laid out
//! for several targets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// IR type representation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IrType {
    /// Void type (no value)
    Void,

    /// Boolean type (one bit wide)
    Bool,

    /// Integer types
    I8,
    I16,
    I32,
    I64,

    /// Integer of an arbitrary bit width (e.g. `i24`).
    /// Use [`IrType::int`] to get the canonical variant for a width.
    Int(u32),

    /// Floating point types
    F32,
    F64,

    /// Pointer type, tagged with the address space it points into
    Ptr {
        pointee: Box<IrType>,
        addr_space: u32,
    },

    /// Array type with known size
    Array(Box<IrType>, usize),

    /// Structure type
    Struct {
        name: String,
        fields: Vec<IrType>,
    },

    /// SIMD vector type (fixed-size, homogeneous)
    Vector {
        /// Element type (integer, bool, float or pointer)
        element: Box<IrType>,
        /// Number of elements
        count: usize,
    },
}

impl Default for IrType {
    fn default() -> Self {
        IrType::Void
    }
}

impl IrType {
    /// Pointer into the default address space
    pub fn ptr(pointee: IrType) -> Self {
        Self::ptr_in(pointee, 0)
    }

    /// Pointer into a specific address space
    pub fn ptr_in(pointee: IrType, addr_space: u32) -> Self {
        IrType::Ptr {
            pointee: Box::new(pointee),
            addr_space,
        }
    }

    /// Create a SIMD vector type from element type and count
    pub fn vector(element: IrType, count: usize) -> Self {
        IrType::Vector {
            element: Box::new(element),
            count,
        }
    }

    /// Integer type of exactly `bits` bits, preferring the named variants.
    pub fn int(bits: u32) -> Self {
        match bits {
            1 => IrType::Bool,
            8 => IrType::I8,
            16 => IrType::I16,
            32 => IrType::I32,
            64 => IrType::I64,
            other => IrType::Int(other),
        }
    }

    /// Width of an integer or float type in bits
    pub fn primitive_bits(&self) -> Option<u32> {
        match self {
            IrType::Bool => Some(1),
            IrType::I8 => Some(8),
            IrType::I16 => Some(16),
            IrType::I32 | IrType::F32 => Some(32),
            IrType::I64 | IrType::F64 => Some(64),
            IrType::Int(bits) => Some(*bits),
            _ => None,
        }
    }

    /// Check if this is an integer type (including `Bool`)
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            IrType::Bool | IrType::I8 | IrType::I16 | IrType::I32 | IrType::I64 | IrType::Int(_)
        )
    }

    /// Check if this is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, IrType::F32 | IrType::F64)
    }

    /// Check if this is a pointer type
    pub fn is_pointer(&self) -> bool {
        matches!(self, IrType::Ptr { .. })
    }

    /// Check if this is a SIMD vector type
    pub fn is_vector(&self) -> bool {
        matches!(self, IrType::Vector { .. })
    }

    pub fn is_int_or_int_vector(&self) -> bool {
        self.scalar_type().is_integer()
    }

    pub fn is_ptr_or_ptr_vector(&self) -> bool {
        self.scalar_type().is_pointer()
    }

    /// The element type for vectors, the type itself otherwise
    pub fn scalar_type(&self) -> &IrType {
        match self {
            IrType::Vector { element, .. } => element,
            other => other,
        }
    }

    /// Whether this type may be used as the lane of a vector
    pub fn is_valid_lane_type(&self) -> bool {
        self.is_integer() || self.is_float() || self.is_pointer()
    }

    /// Get the element type if this is a vector
    pub fn vector_element(&self) -> Option<&IrType> {
        match self {
            IrType::Vector { element, .. } => Some(element),
            _ => None,
        }
    }

    /// Get the element count if this is a vector
    pub fn vector_count(&self) -> Option<usize> {
        match self {
            IrType::Vector { count, .. } => Some(*count),
            _ => None,
        }
    }

    /// Get the pointee if this is a pointer
    pub fn pointee(&self) -> Option<&IrType> {
        match self {
            IrType::Ptr { pointee, .. } => Some(pointee),
            _ => None,
        }
    }

    /// Address space of a pointer (or vector of pointers)
    pub fn addr_space(&self) -> Option<u32> {
        match self.scalar_type() {
            IrType::Ptr { addr_space, .. } => Some(*addr_space),
            _ => None,
        }
    }

    /// Type reached by stepping into this aggregate with a constant index.
    /// Struct fields require a constant index; arrays and vectors do not.
    pub fn element_at(&self, const_index: Option<i64>) -> Option<&IrType> {
        match self {
            IrType::Array(elem, _) => Some(elem),
            IrType::Vector { element, .. } => Some(element),
            IrType::Struct { fields, .. } => {
                let index = usize::try_from(const_index?).ok()?;
                fields.get(index)
            }
            _ => None,
        }
    }
}

/// IR constant value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrValue {
    /// Undefined value
    Undef,
    /// Null pointer
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value; the width comes from the constant's type
    Int(i64),
    /// Floating point values
    F32(f32),
    F64(f64),
}

impl IrValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            IrValue::Int(v) => Some(*v),
            IrValue::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, IrValue::Null)
    }
}

impl fmt::Display for IrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrValue::Undef => write!(f, "undef"),
            IrValue::Null => write!(f, "null"),
            IrValue::Bool(b) => write!(f, "{}", b),
            IrValue::Int(v) => write!(f, "{}", v),
            IrValue::F32(v) => write!(f, "{:?}", v),
            IrValue::F64(v) => write!(f, "{:?}", v),
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::Bool => write!(f, "bool"),
            IrType::I8 => write!(f, "i8"),
            IrType::I16 => write!(f, "i16"),
            IrType::I32 => write!(f, "i32"),
            IrType::I64 => write!(f, "i64"),
            IrType::Int(bits) => write!(f, "i{}", bits),
            IrType::F32 => write!(f, "f32"),
            IrType::F64 => write!(f, "f64"),
            IrType::Ptr {
                pointee,
                addr_space: 0,
            } => write!(f, "*{}", pointee),
            IrType::Ptr {
                pointee,
                addr_space,
            } => write!(f, "*addrspace({}) {}", addr_space, pointee),
            IrType::Array(ty, size) => write!(f, "[{}; {}]", ty, size),
            IrType::Struct { name, .. } => write!(f, "struct {}", name),
            IrType::Vector { element, count } => write!(f, "vec<{}; {}>", element, count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_display() {
        assert_eq!(format!("{}", IrType::I32), "i32");
        assert_eq!(format!("{}", IrType::ptr(IrType::I32)), "*i32");
        assert_eq!(
            format!("{}", IrType::ptr_in(IrType::F32, 3)),
            "*addrspace(3) f32"
        );
        assert_eq!(
            format!("{}", IrType::Array(Box::new(IrType::I8), 16)),
            "[i8; 16]"
        );
        assert_eq!(format!("{}", IrType::vector(IrType::F32, 4)), "vec<f32; 4>");
        assert_eq!(format!("{}", IrType::Int(24)), "i24");
    }

    #[test]
    fn test_int_prefers_named_variants() {
        assert_eq!(IrType::int(32), IrType::I32);
        assert_eq!(IrType::int(1), IrType::Bool);
        assert_eq!(IrType::int(48), IrType::Int(48));
    }

    #[test]
    fn test_lane_types() {
        assert!(IrType::I16.is_valid_lane_type());
        assert!(IrType::F64.is_valid_lane_type());
        assert!(IrType::ptr(IrType::I8).is_valid_lane_type());
        assert!(!IrType::Array(Box::new(IrType::I8), 4).is_valid_lane_type());
        assert!(!IrType::Void.is_valid_lane_type());

        let v = IrType::vector(IrType::I16, 2);
        assert!(v.is_int_or_int_vector());
        assert_eq!(v.scalar_type(), &IrType::I16);
        assert_eq!(IrType::vector(IrType::ptr_in(IrType::I8, 1), 2).addr_space(), Some(1));
    }

    #[test]
    fn test_element_at() {
        let s = IrType::Struct {
            name: "pair".to_string(),
            fields: vec![IrType::I32, IrType::F64],
        };
        assert_eq!(s.element_at(Some(1)), Some(&IrType::F64));
        assert_eq!(s.element_at(None), None);
        let a = IrType::Array(Box::new(IrType::I16), 8);
        assert_eq!(a.element_at(None), Some(&IrType::I16));
    }
}
