//! Reference interpreter for IR functions
//!
//! Executes a function over a flat little-endian byte memory. Stack slots are
//! bump-allocated; pointer arguments are addresses of buffers the caller
//! placed in the same memory with [`Memory::allocate`]. The interpreter is
//! slow and strict: reading a missing value, storing `undef`, or touching
//! memory outside an allocation is an error rather than undefined behavior.
//!
//! It is used to check that rewrites preserve observable behavior.

use super::analysis::value_tracking::wrap_to_bits;
use super::analysis::{DataLayout, LayoutOracle};
use super::{
    BinaryOp, CastOp, CompareOp, GepIndex, IrBlockId, IrFunction, IrId, IrInstruction,
    IrTerminator, IrType, IrValue, LaneIndex,
};
use fxhash::FxHashMap;
use log::trace;
use std::fmt;

/// Default number of instructions executed before giving up
const DEFAULT_STEP_LIMIT: usize = 1_000_000;

/// Addresses below this are never handed out, so null is always invalid
const NULL_GUARD: u64 = 16;

/// A runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum RtValue {
    /// Integer of `bits` width, stored zero-extended
    Int { bits: u32, value: u64 },
    F32(f32),
    F64(f64),
    Ptr(u64),
    Vector(Vec<RtValue>),
    Undef,
}

impl RtValue {
    pub fn int(bits: u32, value: i64) -> Self {
        RtValue::Int {
            bits,
            value: (value as u64) & mask(bits),
        }
    }

    pub fn bool(value: bool) -> Self {
        RtValue::Int {
            bits: 1,
            value: u64::from(value),
        }
    }

    /// Signed interpretation of an integer value
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RtValue::Int { bits, value } => Some(wrap_to_bits(*value as i64, *bits)),
            RtValue::Ptr(addr) => Some(*addr as i64),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            RtValue::Int { value, .. } => Some(*value),
            RtValue::Ptr(addr) => Some(*addr),
            _ => None,
        }
    }

    fn contains_undef(&self) -> bool {
        match self {
            RtValue::Undef => true,
            RtValue::Vector(lanes) => lanes.iter().any(RtValue::contains_undef),
            _ => false,
        }
    }
}

impl fmt::Display for RtValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RtValue::Int { bits, value } => write!(f, "i{} {}", bits, wrap_to_bits(*value as i64, *bits)),
            RtValue::F32(v) => write!(f, "f32 {}", v),
            RtValue::F64(v) => write!(f, "f64 {}", v),
            RtValue::Ptr(addr) => write!(f, "ptr 0x{:x}", addr),
            RtValue::Vector(lanes) => {
                write!(f, "<")?;
                for (i, lane) in lanes.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", lane)?;
                }
                write!(f, ">")
            }
            RtValue::Undef => write!(f, "undef"),
        }
    }
}

fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Interpreter failure
#[derive(Debug, Clone, PartialEq)]
pub enum InterpError {
    /// Access of `len` bytes at `addr` is outside every allocation
    OutOfBounds { addr: u64, len: u64 },
    /// A register was read before being defined
    UndefinedValue(IrId),
    /// An `undef` value reached memory or control flow
    UndefUsed(String),
    /// An operand does not fit the operation
    TypeMismatch(String),
    ArgumentCount { expected: usize, found: usize },
    /// A call to a function no handler was registered for
    UnknownCallee(String),
    MissingBlock(IrBlockId),
    Unreachable(IrBlockId),
    StepLimitExceeded(usize),
}

impl fmt::Display for InterpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpError::OutOfBounds { addr, len } => {
                write!(f, "memory access of {} bytes at 0x{:x} is out of bounds", len, addr)
            }
            InterpError::UndefinedValue(id) => write!(f, "value {} used before definition", id),
            InterpError::UndefUsed(what) => write!(f, "undef value used by {}", what),
            InterpError::TypeMismatch(msg) => write!(f, "type mismatch: {}", msg),
            InterpError::ArgumentCount { expected, found } => {
                write!(f, "expected {} arguments, found {}", expected, found)
            }
            InterpError::UnknownCallee(name) => write!(f, "call to unknown function '{}'", name),
            InterpError::MissingBlock(block) => write!(f, "branch to missing block {}", block),
            InterpError::Unreachable(block) => write!(f, "reached unreachable in {}", block),
            InterpError::StepLimitExceeded(limit) => {
                write!(f, "execution exceeded {} steps", limit)
            }
        }
    }
}

impl std::error::Error for InterpError {}

/// Flat byte-addressed memory
#[derive(Debug, Clone)]
pub struct Memory {
    bytes: Vec<u8>,
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory {
    pub fn new() -> Self {
        Self {
            bytes: vec![0; NULL_GUARD as usize],
        }
    }

    /// Reserve `size` zeroed bytes aligned to `align` and return their address
    pub fn allocate(&mut self, size: u64, align: u64) -> u64 {
        let align = align.max(1);
        let addr = (self.bytes.len() as u64).div_ceil(align) * align;
        self.bytes.resize((addr + size.max(1)) as usize, 0);
        addr
    }

    /// Allocate a buffer holding a copy of `data`
    pub fn allocate_bytes(&mut self, data: &[u8], align: u64) -> u64 {
        let addr = self.allocate(data.len() as u64, align);
        let start = addr as usize;
        self.bytes[start..start + data.len()].copy_from_slice(data);
        addr
    }

    fn range(&self, addr: u64, len: u64) -> Result<std::ops::Range<usize>, InterpError> {
        let end = addr.checked_add(len);
        match end {
            Some(end) if addr >= NULL_GUARD && end <= self.bytes.len() as u64 => {
                Ok(addr as usize..end as usize)
            }
            _ => Err(InterpError::OutOfBounds { addr, len }),
        }
    }

    pub fn read(&self, addr: u64, len: u64) -> Result<&[u8], InterpError> {
        let range = self.range(addr, len)?;
        Ok(&self.bytes[range])
    }

    pub fn write(&mut self, addr: u64, data: &[u8]) -> Result<(), InterpError> {
        let range = self.range(addr, data.len() as u64)?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }
}

/// Handler for calls to external functions
pub type ExternFn = fn(&mut Memory, &[RtValue]) -> Result<Option<RtValue>, InterpError>;

/// Executes IR functions against a shared memory
pub struct Interpreter {
    layout: DataLayout,
    memory: Memory,
    externs: FxHashMap<String, ExternFn>,
    step_limit: usize,
}

impl Interpreter {
    pub fn new(layout: DataLayout) -> Self {
        Self {
            layout,
            memory: Memory::new(),
            externs: FxHashMap::default(),
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    /// Route calls to `name` to `handler`
    pub fn register_extern(&mut self, name: impl Into<String>, handler: ExternFn) {
        self.externs.insert(name.into(), handler);
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    /// Run `func` to completion and return its result
    pub fn run(&mut self, func: &IrFunction, args: &[RtValue]) -> Result<Option<RtValue>, InterpError> {
        let params = &func.signature.parameters;
        if params.len() != args.len() {
            return Err(InterpError::ArgumentCount {
                expected: params.len(),
                found: args.len(),
            });
        }
        trace!("interp: running {} with {} args", func.name, args.len());

        let mut frame = Frame {
            values: FxHashMap::default(),
        };
        for (param, arg) in params.iter().zip(args) {
            frame.values.insert(param.reg, arg.clone());
        }

        let mut steps = 0usize;
        let mut block = func.entry_block();
        loop {
            let body = func
                .cfg
                .get_block(block)
                .ok_or(InterpError::MissingBlock(block))?;
            for &id in &body.instructions {
                steps += 1;
                if steps > self.step_limit {
                    return Err(InterpError::StepLimitExceeded(self.step_limit));
                }
                let Some(inst) = func.inst(id) else {
                    continue;
                };
                self.step(func, &mut frame, inst)?;
            }

            let next = match &body.terminator {
                IrTerminator::Return { value } => {
                    return value.map(|v| frame.get(v)).transpose();
                }
                IrTerminator::Unreachable => return Err(InterpError::Unreachable(block)),
                IrTerminator::Branch { target } => *target,
                IrTerminator::CondBranch {
                    condition,
                    true_target,
                    false_target,
                } => match frame.get(*condition)? {
                    RtValue::Int { value, .. } if value != 0 => *true_target,
                    RtValue::Int { .. } => *false_target,
                    RtValue::Undef => return Err(InterpError::UndefUsed("branch".to_string())),
                    other => {
                        return Err(InterpError::TypeMismatch(format!(
                            "branch condition {}",
                            other
                        )))
                    }
                },
            };

            let target = func
                .cfg
                .get_block(next)
                .ok_or(InterpError::MissingBlock(next))?;
            let mut incoming = Vec::with_capacity(target.phi_nodes.len());
            for phi in &target.phi_nodes {
                let value = phi
                    .incoming
                    .iter()
                    .find(|(from, _)| *from == block)
                    .map(|(_, v)| frame.get(*v))
                    .transpose()?
                    .unwrap_or(RtValue::Undef);
                incoming.push((phi.dest, value));
            }
            frame.values.extend(incoming);
            block = next;
        }
    }

    fn step(&mut self, func: &IrFunction, frame: &mut Frame, inst: &IrInstruction) -> Result<(), InterpError> {
        let result = match inst {
            IrInstruction::Const { value, ty, .. } => Some(self.constant(value, ty)),
            IrInstruction::Alloca { ty, align, .. } => {
                let size = self.layout.alloc_size_bytes(ty);
                let align = u64::from((*align).max(self.layout.abi_align(ty)));
                Some(RtValue::Ptr(self.memory.allocate(size, align)))
            }
            IrInstruction::Load { ptr, ty, .. } => {
                let addr = self.address(frame, *ptr)?;
                let len = self.layout.store_size_bytes(ty);
                let bytes = self.memory.read(addr, len)?.to_vec();
                Some(self.decode(&bytes, ty)?)
            }
            IrInstruction::Store { ptr, value, ty, .. } => {
                let addr = self.address(frame, *ptr)?;
                let value = frame.get(*value)?;
                if value.contains_undef() {
                    return Err(InterpError::UndefUsed("store".to_string()));
                }
                let mut bytes = Vec::new();
                self.encode(&value, ty, &mut bytes)?;
                self.memory.write(addr, &bytes)?;
                None
            }
            IrInstruction::GetElementPtr {
                ptr,
                source_ty,
                indices,
                ..
            } => {
                let base = self.address(frame, *ptr)?;
                let offset = self.gep_offset(frame, source_ty, indices)?;
                let bits = func
                    .value_type(*ptr)
                    .and_then(|t| t.addr_space())
                    .map(|space| self.layout.pointer_size_bits(space))
                    .unwrap_or(64);
                Some(RtValue::Ptr(base.wrapping_add(offset as u64) & mask(bits)))
            }
            IrInstruction::BinOp {
                op, left, right, ..
            } => Some(binop(*op, frame.get(*left)?, frame.get(*right)?)?),
            IrInstruction::Cmp {
                op, left, right, ..
            } => Some(compare(*op, &frame.get(*left)?, &frame.get(*right)?)?),
            IrInstruction::Cast { op, src, ty, .. } => {
                let value = frame.get(*src)?;
                let from = func
                    .value_type(*src)
                    .ok_or(InterpError::UndefinedValue(*src))?;
                Some(self.cast(*op, value, from, ty)?)
            }
            IrInstruction::ExtractElement { vector, index, .. } => {
                let lane = self.lane(frame, index)?;
                match frame.get(*vector)? {
                    RtValue::Vector(lanes) => Some(lanes.get(lane).cloned().unwrap_or(RtValue::Undef)),
                    RtValue::Undef => Some(RtValue::Undef),
                    other => {
                        return Err(InterpError::TypeMismatch(format!("extract from {}", other)))
                    }
                }
            }
            IrInstruction::InsertElement {
                dest,
                vector,
                scalar,
                index,
            } => {
                let lane = self.lane(frame, index)?;
                let scalar = frame.get(*scalar)?;
                let mut lanes = match frame.get(*vector)? {
                    RtValue::Vector(lanes) => lanes,
                    RtValue::Undef => {
                        let count = func
                            .value_type(*dest)
                            .and_then(|t| t.vector_count())
                            .unwrap_or(0);
                        vec![RtValue::Undef; count]
                    }
                    other => {
                        return Err(InterpError::TypeMismatch(format!("insert into {}", other)))
                    }
                };
                if let Some(slot) = lanes.get_mut(lane) {
                    *slot = scalar;
                }
                Some(RtValue::Vector(lanes))
            }
            IrInstruction::Call { callee, args, .. } => {
                let handler = *self
                    .externs
                    .get(callee)
                    .ok_or_else(|| InterpError::UnknownCallee(callee.clone()))?;
                let args = args
                    .iter()
                    .map(|a| frame.get(*a))
                    .collect::<Result<Vec<_>, _>>()?;
                handler(&mut self.memory, &args)?
            }
        };
        if let (Some(dest), Some(value)) = (inst.dest(), result) {
            frame.values.insert(dest, value);
        }
        Ok(())
    }

    fn constant(&self, value: &IrValue, ty: &IrType) -> RtValue {
        match value {
            IrValue::Undef => RtValue::Undef,
            IrValue::Null => RtValue::Ptr(0),
            IrValue::Bool(b) => RtValue::bool(*b),
            IrValue::Int(v) => RtValue::int(self.int_bits(ty), *v),
            IrValue::F32(v) => RtValue::F32(*v),
            IrValue::F64(v) => RtValue::F64(*v),
        }
    }

    fn int_bits(&self, ty: &IrType) -> u32 {
        self.layout.type_size_bits(ty) as u32
    }

    fn address(&self, frame: &Frame, ptr: IrId) -> Result<u64, InterpError> {
        match frame.get(ptr)? {
            RtValue::Ptr(addr) => Ok(addr),
            RtValue::Undef => Err(InterpError::UndefUsed("address".to_string())),
            other => Err(InterpError::TypeMismatch(format!("{} used as a pointer", other))),
        }
    }

    fn lane(&self, frame: &Frame, index: &LaneIndex) -> Result<usize, InterpError> {
        match index {
            LaneIndex::Const(c) => Ok(*c as usize),
            LaneIndex::Value(v) => frame
                .get(*v)?
                .as_u64()
                .map(|l| l as usize)
                .ok_or_else(|| InterpError::TypeMismatch("lane index".to_string())),
        }
    }

    fn gep_offset(&self, frame: &Frame, source_ty: &IrType, indices: &[GepIndex]) -> Result<i64, InterpError> {
        let mut offset = 0i64;
        let mut current = source_ty;
        for (i, index) in indices.iter().enumerate() {
            let value = match index {
                GepIndex::Const(c) => *c,
                GepIndex::Value(v) => frame
                    .get(*v)?
                    .as_i64()
                    .ok_or_else(|| InterpError::TypeMismatch("gep index".to_string()))?,
            };
            if i == 0 {
                offset = offset.wrapping_add(value.wrapping_mul(self.layout.alloc_size_bytes(current) as i64));
                continue;
            }
            match current {
                IrType::Struct { fields, .. } => {
                    let field = usize::try_from(value)
                        .map_err(|_| InterpError::TypeMismatch("struct field index".to_string()))?;
                    let field_offset = self
                        .layout
                        .struct_field_offset(fields, field)
                        .ok_or_else(|| InterpError::TypeMismatch("struct field index".to_string()))?;
                    offset = offset.wrapping_add(field_offset as i64);
                    current = &fields[field];
                }
                IrType::Array(elem, _) | IrType::Vector { element: elem, .. } => {
                    offset = offset.wrapping_add(value.wrapping_mul(self.layout.alloc_size_bytes(elem) as i64));
                    current = elem;
                }
                other => {
                    return Err(InterpError::TypeMismatch(format!("gep into {}", other)));
                }
            }
        }
        Ok(offset)
    }

    fn encode(&self, value: &RtValue, ty: &IrType, out: &mut Vec<u8>) -> Result<(), InterpError> {
        let size = self.layout.store_size_bytes(ty) as usize;
        match (value, ty) {
            (RtValue::Vector(lanes), IrType::Vector { element, count }) if lanes.len() == *count => {
                for lane in lanes {
                    self.encode(lane, element, out)?;
                }
                Ok(())
            }
            (RtValue::Int { value, .. }, t) if t.is_integer() => {
                out.extend_from_slice(&value.to_le_bytes()[..size.min(8)]);
                Ok(())
            }
            (RtValue::Ptr(addr), IrType::Ptr { .. }) => {
                out.extend_from_slice(&addr.to_le_bytes()[..size.min(8)]);
                Ok(())
            }
            (RtValue::F32(v), IrType::F32) => {
                out.extend_from_slice(&v.to_bits().to_le_bytes());
                Ok(())
            }
            (RtValue::F64(v), IrType::F64) => {
                out.extend_from_slice(&v.to_bits().to_le_bytes());
                Ok(())
            }
            (value, ty) => Err(InterpError::TypeMismatch(format!("cannot store {} as {}", value, ty))),
        }
    }

    fn decode(&self, bytes: &[u8], ty: &IrType) -> Result<RtValue, InterpError> {
        let mut word = [0u8; 8];
        let n = bytes.len().min(8);
        word[..n].copy_from_slice(&bytes[..n]);
        let raw = u64::from_le_bytes(word);
        match ty {
            IrType::Vector { element, count } => {
                let lane_bytes = self.layout.store_size_bytes(element) as usize;
                (0..*count)
                    .map(|i| {
                        let start = i * lane_bytes;
                        bytes
                            .get(start..start + lane_bytes)
                            .ok_or_else(|| InterpError::TypeMismatch(format!("short read of {}", ty)))
                            .and_then(|lane| self.decode(lane, element))
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(RtValue::Vector)
            }
            t if t.is_integer() => {
                let bits = self.int_bits(t);
                Ok(RtValue::Int {
                    bits,
                    value: raw & mask(bits),
                })
            }
            IrType::Ptr { .. } => Ok(RtValue::Ptr(raw)),
            IrType::F32 => Ok(RtValue::F32(f32::from_bits(raw as u32))),
            IrType::F64 => Ok(RtValue::F64(f64::from_bits(raw))),
            other => Err(InterpError::TypeMismatch(format!("cannot load {}", other))),
        }
    }

    fn cast(&self, op: CastOp, value: RtValue, from: &IrType, to: &IrType) -> Result<RtValue, InterpError> {
        if value.contains_undef() {
            return Ok(RtValue::Undef);
        }
        let to_bits = self.int_bits(to);
        match op {
            CastOp::ZExt | CastOp::Trunc => match value {
                RtValue::Int { value, .. } => Ok(RtValue::Int {
                    bits: to_bits,
                    value: value & mask(to_bits),
                }),
                other => Err(InterpError::TypeMismatch(format!("{:?} of {}", op, other))),
            },
            CastOp::SExt => match value {
                RtValue::Int { bits, value } => Ok(RtValue::int(to_bits, wrap_to_bits(value as i64, bits))),
                other => Err(InterpError::TypeMismatch(format!("sext of {}", other))),
            },
            CastOp::PtrToInt => match value {
                RtValue::Ptr(addr) => Ok(RtValue::Int {
                    bits: to_bits,
                    value: addr & mask(to_bits),
                }),
                other => Err(InterpError::TypeMismatch(format!("ptrtoint of {}", other))),
            },
            CastOp::IntToPtr => match value {
                RtValue::Int { value, .. } => Ok(RtValue::Ptr(value)),
                other => Err(InterpError::TypeMismatch(format!("inttoptr of {}", other))),
            },
            CastOp::BitCast => {
                let mut bytes = Vec::new();
                self.encode(&value, from, &mut bytes)?;
                self.decode(&bytes, to)
            }
        }
    }
}

struct Frame {
    values: FxHashMap<IrId, RtValue>,
}

impl Frame {
    fn get(&self, id: IrId) -> Result<RtValue, InterpError> {
        self.values
            .get(&id)
            .cloned()
            .ok_or(InterpError::UndefinedValue(id))
    }
}

fn binop(op: BinaryOp, left: RtValue, right: RtValue) -> Result<RtValue, InterpError> {
    match (left, right) {
        (RtValue::Undef, _) | (_, RtValue::Undef) => Ok(RtValue::Undef),
        (RtValue::Vector(l), RtValue::Vector(r)) if l.len() == r.len() => l
            .into_iter()
            .zip(r)
            .map(|(a, b)| binop(op, a, b))
            .collect::<Result<Vec<_>, _>>()
            .map(RtValue::Vector),
        (RtValue::Int { bits, value: a }, RtValue::Int { value: b, .. }) => {
            let shift = (b as u32).min(63);
            let value = match op {
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::Sub => a.wrapping_sub(b),
                BinaryOp::Mul => a.wrapping_mul(b),
                BinaryOp::And => a & b,
                BinaryOp::Or => a | b,
                BinaryOp::Xor => a ^ b,
                BinaryOp::Shl => a.checked_shl(shift).unwrap_or(0),
                BinaryOp::LShr => a.checked_shr(shift).unwrap_or(0),
                BinaryOp::AShr => (wrap_to_bits(a as i64, bits) >> shift) as u64,
                BinaryOp::FAdd | BinaryOp::FSub | BinaryOp::FMul => {
                    return Err(InterpError::TypeMismatch(format!("{:?} on integers", op)))
                }
            };
            Ok(RtValue::Int {
                bits,
                value: value & mask(bits),
            })
        }
        (RtValue::F32(a), RtValue::F32(b)) => match op {
            BinaryOp::FAdd => Ok(RtValue::F32(a + b)),
            BinaryOp::FSub => Ok(RtValue::F32(a - b)),
            BinaryOp::FMul => Ok(RtValue::F32(a * b)),
            _ => Err(InterpError::TypeMismatch(format!("{:?} on f32", op))),
        },
        (RtValue::F64(a), RtValue::F64(b)) => match op {
            BinaryOp::FAdd => Ok(RtValue::F64(a + b)),
            BinaryOp::FSub => Ok(RtValue::F64(a - b)),
            BinaryOp::FMul => Ok(RtValue::F64(a * b)),
            _ => Err(InterpError::TypeMismatch(format!("{:?} on f64", op))),
        },
        (l, r) => Err(InterpError::TypeMismatch(format!("{:?} of {} and {}", op, l, r))),
    }
}

fn compare(op: CompareOp, left: &RtValue, right: &RtValue) -> Result<RtValue, InterpError> {
    if let (RtValue::F32(_) | RtValue::F64(_), RtValue::F32(_) | RtValue::F64(_)) = (left, right) {
        let (a, b) = match (left, right) {
            (RtValue::F32(a), RtValue::F32(b)) => (f64::from(*a), f64::from(*b)),
            (RtValue::F64(a), RtValue::F64(b)) => (*a, *b),
            _ => return Err(InterpError::TypeMismatch("mixed float compare".to_string())),
        };
        let result = match op {
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
            CompareOp::Lt | CompareOp::ULt => a < b,
            CompareOp::Le => a <= b,
            CompareOp::Gt | CompareOp::UGt => a > b,
            CompareOp::Ge => a >= b,
        };
        return Ok(RtValue::bool(result));
    }
    let (Some(sa), Some(sb), Some(ua), Some(ub)) = (left.as_i64(), right.as_i64(), left.as_u64(), right.as_u64())
    else {
        return Err(InterpError::TypeMismatch(format!("compare {} with {}", left, right)));
    };
    let result = match op {
        CompareOp::Eq => ua == ub,
        CompareOp::Ne => ua != ub,
        CompareOp::Lt => sa < sb,
        CompareOp::Le => sa <= sb,
        CompareOp::Gt => sa > sb,
        CompareOp::Ge => sa >= sb,
        CompareOp::ULt => ua < ub,
        CompareOp::UGt => ua > ub,
    };
    Ok(RtValue::bool(result))
}
