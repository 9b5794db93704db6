//! Linear symbolic forms and known-bits analysis
//!
//! Values are folded into `Σ coeff·atom + constant`, where atoms are values
//! the analysis does not look through (parameters, loads, extensions, ...).
//! Arithmetic is modular, so two equal forms denote equal values at any
//! width. A GEP index narrower than the pointer is implicitly sign-extended
//! and therefore stays opaque.

use super::value_tracking::is_pointer_bitcast;
use super::{DataLayout, LayoutOracle, SymbolicAddressOracle};
use crate::ir::{BinaryOp, CastOp, GepIndex, IrFunction, IrId, IrInstruction, IrType, IrValue};
use std::collections::BTreeMap;

/// How deep the analyses recurse through operands
const MAX_DEPTH: u32 = 12;

/// Known-bits recursion limit
const MAX_KNOWN_BITS_DEPTH: u32 = 6;

/// A linear combination of opaque values plus a constant
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SymExpr {
    terms: BTreeMap<IrId, i64>,
    constant: i64,
}

impl SymExpr {
    pub fn constant(value: i64) -> Self {
        Self {
            terms: BTreeMap::new(),
            constant: value,
        }
    }

    pub fn atom(value: IrId) -> Self {
        let mut terms = BTreeMap::new();
        terms.insert(value, 1);
        Self { terms, constant: 0 }
    }

    pub fn as_constant(&self) -> Option<i64> {
        self.terms.is_empty().then_some(self.constant)
    }

    pub fn constant_part(&self) -> i64 {
        self.constant
    }

    #[must_use]
    pub fn add_constant(mut self, value: i64) -> Self {
        self.constant = self.constant.wrapping_add(value);
        self
    }

    #[must_use]
    pub fn add(mut self, other: &SymExpr) -> Self {
        for (&atom, &coeff) in &other.terms {
            let entry = self.terms.entry(atom).or_insert(0);
            *entry = entry.wrapping_add(coeff);
            if *entry == 0 {
                self.terms.remove(&atom);
            }
        }
        self.constant = self.constant.wrapping_add(other.constant);
        self
    }

    #[must_use]
    pub fn sub(self, other: &SymExpr) -> Self {
        self.add(&other.clone().scale(-1))
    }

    #[must_use]
    pub fn scale(mut self, factor: i64) -> Self {
        if factor == 0 {
            return SymExpr::constant(0);
        }
        for coeff in self.terms.values_mut() {
            *coeff = coeff.wrapping_mul(factor);
        }
        self.terms.retain(|_, c| *c != 0);
        self.constant = self.constant.wrapping_mul(factor);
        self
    }
}

/// Default symbolic oracle over the IR's integer and pointer arithmetic
#[derive(Debug, Clone)]
pub struct SymbolicAnalysis {
    layout: DataLayout,
}

impl SymbolicAnalysis {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    fn type_bits(&self, func: &IrFunction, value: IrId) -> u64 {
        func.value_type(value)
            .map(|t| self.layout.type_size_bits(t))
            .unwrap_or(0)
    }

    fn build(&self, func: &IrFunction, value: IrId, depth: u32) -> SymExpr {
        if depth >= MAX_DEPTH {
            return SymExpr::atom(value);
        }
        let Some((_, inst)) = func.def_of(value) else {
            return SymExpr::atom(value);
        };
        match inst {
            IrInstruction::Const {
                value: IrValue::Int(c),
                ..
            } => SymExpr::constant(*c),
            IrInstruction::Const {
                value: IrValue::Null,
                ..
            } => SymExpr::constant(0),
            IrInstruction::BinOp {
                op, left, right, ..
            } => {
                let l = self.build(func, *left, depth + 1);
                let r = self.build(func, *right, depth + 1);
                match op {
                    BinaryOp::Add => l.add(&r),
                    BinaryOp::Sub => l.sub(&r),
                    BinaryOp::Mul => match (l.as_constant(), r.as_constant()) {
                        (_, Some(c)) => l.scale(c),
                        (Some(c), _) => r.scale(c),
                        _ => SymExpr::atom(value),
                    },
                    BinaryOp::Shl => match r.as_constant() {
                        Some(c) if (0..63).contains(&c) => l.scale(1i64 << c),
                        _ => SymExpr::atom(value),
                    },
                    _ => SymExpr::atom(value),
                }
            }
            IrInstruction::Cast { op, src, ty, .. } if is_pointer_bitcast(func, *op, *src, ty) => {
                self.build(func, *src, depth + 1)
            }
            IrInstruction::GetElementPtr {
                ptr,
                source_ty,
                indices,
                ..
            } => self
                .gep_expr(func, *ptr, source_ty, indices, depth)
                .unwrap_or_else(|| SymExpr::atom(value)),
            _ => SymExpr::atom(value),
        }
    }

    fn gep_expr(
        &self,
        func: &IrFunction,
        ptr: IrId,
        source_ty: &IrType,
        indices: &[GepIndex],
        depth: u32,
    ) -> Option<SymExpr> {
        let ptr_bits = func
            .value_type(ptr)
            .and_then(|t| t.addr_space())
            .map(|space| u64::from(self.layout.pointer_size_bits(space)))?;

        let mut expr = self.build(func, ptr, depth + 1);
        let mut current = source_ty;
        for (i, index) in indices.iter().enumerate() {
            let stride_of = |ty: &IrType| i64::try_from(self.layout.alloc_size_bytes(ty)).ok();
            let (stride, next): (i64, &IrType) = if i == 0 {
                (stride_of(current)?, current)
            } else {
                match current {
                    IrType::Struct { fields, .. } => {
                        let GepIndex::Const(c) = *index else {
                            return None;
                        };
                        let field = usize::try_from(c).ok()?;
                        let off = self.layout.struct_field_offset(fields, field)?;
                        expr = expr.add_constant(i64::try_from(off).ok()?);
                        current = fields.get(field)?;
                        continue;
                    }
                    IrType::Array(elem, _) | IrType::Vector { element: elem, .. } => {
                        (stride_of(elem)?, elem.as_ref())
                    }
                    _ => return None,
                }
            };
            let index_expr = match *index {
                GepIndex::Const(c) => SymExpr::constant(c),
                GepIndex::Value(v) if self.type_bits(func, v) == ptr_bits => {
                    self.build(func, v, depth + 1)
                }
                GepIndex::Value(v) => SymExpr::atom(v),
            };
            expr = expr.add(&index_expr.scale(stride));
            current = next;
        }
        Some(expr)
    }

    fn known_zero(&self, func: &IrFunction, value: IrId, depth: u32) -> u64 {
        let bits = self.type_bits(func, value);
        if bits == 0 || bits > 64 {
            return 0;
        }
        let mask = if bits == 64 {
            u64::MAX
        } else {
            (1u64 << bits) - 1
        };
        if depth >= MAX_KNOWN_BITS_DEPTH {
            return 0;
        }
        let Some((_, inst)) = func.def_of(value) else {
            return 0;
        };
        let known = match inst {
            IrInstruction::Const {
                value: IrValue::Int(c),
                ..
            } => !(*c as u64),
            IrInstruction::BinOp {
                op, left, right, ..
            } => {
                let l = self.known_zero(func, *left, depth + 1);
                let r = self.known_zero(func, *right, depth + 1);
                let shift_amount = || {
                    self.symbolic(func, *right)
                        .as_constant()
                        .filter(|c| (0..bits as i64).contains(c))
                        .map(|c| c as u32)
                };
                match op {
                    BinaryOp::And => l | r,
                    BinaryOp::Or => l & r,
                    BinaryOp::Shl => match shift_amount() {
                        Some(c) => (l << c) | ((1u64 << c) - 1),
                        None => 0,
                    },
                    BinaryOp::LShr => match shift_amount() {
                        Some(c) => ((l & mask) >> c) | !(mask >> c),
                        None => 0,
                    },
                    BinaryOp::Mul => {
                        let tz = (l.trailing_ones() + r.trailing_ones()).min(63);
                        (1u64 << tz) - 1
                    }
                    BinaryOp::Add => {
                        let tz = l.trailing_ones().min(r.trailing_ones()).min(63);
                        (1u64 << tz) - 1
                    }
                    _ => 0,
                }
            }
            IrInstruction::Cast {
                op: CastOp::ZExt,
                src,
                ..
            } => {
                let src_bits = self.type_bits(func, *src);
                if src_bits == 0 || src_bits >= 64 {
                    self.known_zero(func, *src, depth + 1)
                } else {
                    self.known_zero(func, *src, depth + 1) | !((1u64 << src_bits) - 1)
                }
            }
            IrInstruction::Cast {
                op: CastOp::Trunc,
                src,
                ..
            } => self.known_zero(func, *src, depth + 1),
            _ => 0,
        };
        known & mask
    }
}

impl SymbolicAddressOracle for SymbolicAnalysis {
    fn symbolic(&self, func: &IrFunction, value: IrId) -> SymExpr {
        self.build(func, value, 0)
    }

    fn known_zero_bits(&self, func: &IrFunction, value: IrId) -> u64 {
        self.known_zero(func, value, 0)
    }
}
