//! Replacing a legal chain by one vector access
//!
//! Loads become a wide load followed by lane extracts, placed after the
//! chain's last member. Users of the old loads that sat above that point are
//! moved below the extract that now feeds them. Stores become an insert
//! sequence and one wide store, also after the last member.

use super::access::{AccessKind, MemoryAccess};
use super::chain::Chain;
use super::legalize::ChainShape;
use super::VectorizeError;
use crate::ir::analysis::value_tracking::is_pointer_bitcast;
use crate::ir::analysis::{AnalysisContext, DominanceOracle};
use crate::ir::{
    AccessFlags, AccessMetadata, CastOp, InstId, IrFunction, IrId, IrInstruction, IrType,
    IrValue, LaneIndex, ValueUser,
};
use fxhash::FxHashSet;

/// One original lane extract of a vector load
#[derive(Debug, Clone, PartialEq)]
pub struct LaneUse {
    pub inst: InstId,
    pub dest: IrId,
    pub lane: u32,
    pub ty: IrType,
}

/// How one chain member maps onto the merged vector
#[derive(Debug, Clone, PartialEq)]
pub enum ElementPlan {
    /// Loaded result or stored operand of a scalar access
    Scalar { value: IrId, ty: IrType },
    /// Vector access; loads carry the extracts that consume it
    Vector {
        value: IrId,
        ty: IrType,
        extracts: Vec<LaneUse>,
    },
}

/// Everything the rewrite needs, gathered before the IR is touched
#[derive(Debug, Clone)]
pub struct PreparedChain {
    pub kind: AccessKind,
    /// Members in address order
    pub members: Chain,
    /// Member that comes last in the block
    pub anchor: InstId,
    /// Pointer of the lowest-addressed member
    pub base_ptr: IrId,
    pub addr_space: u32,
    pub vector_ty: IrType,
    pub lane_ty: IrType,
    pub lanes_per_element: usize,
    pub align: u32,
    pub metadata: AccessMetadata,
    pub elements: Vec<ElementPlan>,
}

/// Emission strategy for one access kind
pub trait ChainEmitter {
    fn kind(&self) -> AccessKind;

    /// Gather the rewrite of `chain`; does not modify the function
    fn prepare(
        &self,
        func: &IrFunction,
        chain: &[InstId],
        shape: &ChainShape,
        align: u32,
    ) -> Result<PreparedChain, VectorizeError>;

    /// Emit the vector access and remove the members
    fn apply(
        &self,
        func: &mut IrFunction,
        ctx: &AnalysisContext<'_>,
        prepared: &PreparedChain,
    ) -> Result<(), VectorizeError>;
}

pub struct LoadEmitter;
pub struct StoreEmitter;

pub fn emitter_for(kind: AccessKind) -> &'static dyn ChainEmitter {
    match kind {
        AccessKind::Load => &LoadEmitter,
        AccessKind::Store => &StoreEmitter,
    }
}

/// Cast between two same-sized types: integer/pointer pairs need the
/// dedicated conversions, everything else is a bitcast.
pub fn bit_or_pointer_cast(from: &IrType, to: &IrType) -> CastOp {
    if from.is_ptr_or_ptr_vector() && to.is_int_or_int_vector() {
        CastOp::PtrToInt
    } else if from.is_int_or_int_vector() && to.is_ptr_or_ptr_vector() {
        CastOp::IntToPtr
    } else {
        CastOp::BitCast
    }
}

impl ChainEmitter for LoadEmitter {
    fn kind(&self) -> AccessKind {
        AccessKind::Load
    }

    fn prepare(
        &self,
        func: &IrFunction,
        chain: &[InstId],
        shape: &ChainShape,
        align: u32,
    ) -> Result<PreparedChain, VectorizeError> {
        let mut prepared = describe(func, AccessKind::Load, chain, shape, align)?;
        for &id in chain {
            let access = access_of(func, id)?;
            let value = access.value(func).ok_or(VectorizeError::NotAMemoryAccess(id))?;
            let element = if access.ty.is_vector() {
                ElementPlan::Vector {
                    value,
                    extracts: lane_uses(func, value)?,
                    ty: access.ty,
                }
            } else {
                ElementPlan::Scalar {
                    value,
                    ty: access.ty,
                }
            };
            prepared.elements.push(element);
        }
        Ok(prepared)
    }

    fn apply(
        &self,
        func: &mut IrFunction,
        ctx: &AnalysisContext<'_>,
        prepared: &PreparedChain,
    ) -> Result<(), VectorizeError> {
        let mut cursor = Cursor::new(prepared.anchor);
        let ptr = cursor.pointer_to_vector(func, prepared)?;
        let wide = cursor.emit_value(func, |dest| IrInstruction::Load {
            dest,
            ptr,
            ty: prepared.vector_ty.clone(),
            align: prepared.align,
            flags: AccessFlags::default(),
            metadata: prepared.metadata.clone(),
        })?;

        let mut replacements = Vec::new();
        for (i, element) in prepared.elements.iter().enumerate() {
            let base_lane = i * prepared.lanes_per_element;
            match element {
                ElementPlan::Scalar { value, ty } => {
                    let lane = cursor.extract(func, wide, base_lane, &prepared.lane_ty, ty)?;
                    func.replace_all_uses(*value, lane);
                    replacements.push(lane);
                }
                ElementPlan::Vector { extracts, .. } => {
                    for old in extracts {
                        let lane = base_lane + old.lane as usize;
                        let lane = cursor.extract(func, wide, lane, &prepared.lane_ty, &old.ty)?;
                        func.replace_all_uses(old.dest, lane);
                        func.erase_instruction(old.inst);
                        replacements.push(lane);
                    }
                }
            }
        }

        for value in replacements {
            if let Some(def) = func.def_inst(value) {
                reorder_users(func, ctx.dominance, def);
            }
        }

        erase_members(func, &prepared.members);
        Ok(())
    }
}

impl ChainEmitter for StoreEmitter {
    fn kind(&self) -> AccessKind {
        AccessKind::Store
    }

    fn prepare(
        &self,
        func: &IrFunction,
        chain: &[InstId],
        shape: &ChainShape,
        align: u32,
    ) -> Result<PreparedChain, VectorizeError> {
        let mut prepared = describe(func, AccessKind::Store, chain, shape, align)?;
        for &id in chain {
            let access = access_of(func, id)?;
            let value = access.value(func).ok_or(VectorizeError::NotAMemoryAccess(id))?;
            let element = if access.ty.is_vector() {
                ElementPlan::Vector {
                    value,
                    ty: access.ty,
                    extracts: Vec::new(),
                }
            } else {
                ElementPlan::Scalar {
                    value,
                    ty: access.ty,
                }
            };
            prepared.elements.push(element);
        }
        Ok(prepared)
    }

    fn apply(
        &self,
        func: &mut IrFunction,
        _ctx: &AnalysisContext<'_>,
        prepared: &PreparedChain,
    ) -> Result<(), VectorizeError> {
        let mut cursor = Cursor::new(prepared.anchor);
        let mut packed = cursor.emit_value(func, |dest| IrInstruction::Const {
            dest,
            value: IrValue::Undef,
            ty: prepared.vector_ty.clone(),
        })?;

        for (i, element) in prepared.elements.iter().enumerate() {
            let base_lane = i * prepared.lanes_per_element;
            match element {
                ElementPlan::Scalar { value, ty } => {
                    let scalar = cursor.convert(func, *value, ty, &prepared.lane_ty)?;
                    packed = cursor.insert(func, packed, scalar, base_lane)?;
                }
                ElementPlan::Vector { value, ty, .. } => {
                    let element_ty = ty
                        .vector_element()
                        .ok_or(VectorizeError::MissingOperandType(*value))?;
                    for lane in 0..prepared.lanes_per_element {
                        let scalar =
                            cursor.extract(func, *value, lane, element_ty, &prepared.lane_ty)?;
                        packed = cursor.insert(func, packed, scalar, base_lane + lane)?;
                    }
                }
            }
        }

        let ptr = cursor.pointer_to_vector(func, prepared)?;
        cursor.emit(
            func,
            IrInstruction::Store {
                ptr,
                value: packed,
                ty: prepared.vector_ty.clone(),
                align: prepared.align,
                flags: AccessFlags::default(),
                metadata: prepared.metadata.clone(),
            },
        )?;

        erase_members(func, &prepared.members);
        Ok(())
    }
}

/// The parts of a prepared chain shared by loads and stores
fn describe(
    func: &IrFunction,
    kind: AccessKind,
    chain: &[InstId],
    shape: &ChainShape,
    align: u32,
) -> Result<PreparedChain, VectorizeError> {
    let &first = chain.first().ok_or(VectorizeError::EmptyChain)?;
    let base_ptr = access_of(func, first)?.ptr;

    let mut in_program_order: Vec<(usize, InstId)> = chain
        .iter()
        .map(|&id| {
            func.position(id)
                .map(|pos| (pos, id))
                .ok_or(VectorizeError::MissingInstruction(id))
        })
        .collect::<Result<_, _>>()?;
    in_program_order.sort_unstable();
    let anchor = in_program_order
        .last()
        .map(|&(_, id)| id)
        .ok_or(VectorizeError::EmptyChain)?;

    let mut tags = Vec::with_capacity(chain.len());
    for &(_, id) in &in_program_order {
        let access = access_of(func, id)?;
        tags.push(access.metadata(func).ok_or(VectorizeError::NotAMemoryAccess(id))?);
    }

    Ok(PreparedChain {
        kind,
        members: chain.iter().copied().collect(),
        anchor,
        base_ptr,
        addr_space: shape.addr_space,
        vector_ty: shape.vector_type(chain.len()),
        lane_ty: shape.lane_ty.clone(),
        lanes_per_element: shape.lanes_per_element,
        align,
        metadata: AccessMetadata::merge(tags),
        elements: Vec::with_capacity(chain.len()),
    })
}

fn access_of(func: &IrFunction, id: InstId) -> Result<MemoryAccess, VectorizeError> {
    MemoryAccess::from_inst(func, id).ok_or(VectorizeError::NotAMemoryAccess(id))
}

/// Constant-lane extracts consuming a vector load
fn lane_uses(func: &IrFunction, value: IrId) -> Result<Vec<LaneUse>, VectorizeError> {
    let mut uses = Vec::new();
    for user in func.users(value) {
        let ValueUser::Inst(inst) = user else {
            return Err(VectorizeError::NonLaneUser(value));
        };
        match func.inst(inst) {
            Some(IrInstruction::ExtractElement {
                dest,
                vector,
                index: LaneIndex::Const(lane),
            }) if *vector == value => {
                let ty = func
                    .value_type(*dest)
                    .cloned()
                    .ok_or(VectorizeError::MissingOperandType(*dest))?;
                uses.push(LaneUse {
                    inst,
                    dest: *dest,
                    lane: *lane,
                    ty,
                });
            }
            _ => return Err(VectorizeError::NonLaneUser(value)),
        }
    }
    Ok(uses)
}

/// Appends instructions one after another, starting behind an anchor
struct Cursor {
    at: InstId,
}

impl Cursor {
    fn new(at: InstId) -> Self {
        Self { at }
    }

    fn emit(&mut self, func: &mut IrFunction, inst: IrInstruction) -> Result<InstId, VectorizeError> {
        let id = func
            .insert_after(self.at, inst)
            .ok_or(VectorizeError::MissingInstruction(self.at))?;
        self.at = id;
        Ok(id)
    }

    fn emit_value(
        &mut self,
        func: &mut IrFunction,
        build: impl FnOnce(IrId) -> IrInstruction,
    ) -> Result<IrId, VectorizeError> {
        let dest = func.alloc_reg();
        self.emit(func, build(dest))?;
        Ok(dest)
    }

    /// `value` reinterpreted as `to`, or `value` itself if the types agree
    fn convert(
        &mut self,
        func: &mut IrFunction,
        value: IrId,
        from: &IrType,
        to: &IrType,
    ) -> Result<IrId, VectorizeError> {
        if from == to {
            return Ok(value);
        }
        let op = bit_or_pointer_cast(from, to);
        self.emit_value(func, |dest| IrInstruction::Cast {
            dest,
            op,
            src: value,
            ty: to.clone(),
        })
    }

    /// Lane `lane` of `vector`, whose lanes are `lane_ty`, as a `want`
    fn extract(
        &mut self,
        func: &mut IrFunction,
        vector: IrId,
        lane: usize,
        lane_ty: &IrType,
        want: &IrType,
    ) -> Result<IrId, VectorizeError> {
        let scalar = self.emit_value(func, |dest| IrInstruction::ExtractElement {
            dest,
            vector,
            index: LaneIndex::Const(lane as u32),
        })?;
        self.convert(func, scalar, lane_ty, want)
    }

    fn insert(
        &mut self,
        func: &mut IrFunction,
        vector: IrId,
        scalar: IrId,
        lane: usize,
    ) -> Result<IrId, VectorizeError> {
        self.emit_value(func, |dest| IrInstruction::InsertElement {
            dest,
            vector,
            scalar,
            index: LaneIndex::Const(lane as u32),
        })
    }

    /// The chain's base pointer typed as a pointer to the merged vector
    fn pointer_to_vector(
        &mut self,
        func: &mut IrFunction,
        prepared: &PreparedChain,
    ) -> Result<IrId, VectorizeError> {
        let want = IrType::ptr_in(prepared.vector_ty.clone(), prepared.addr_space);
        let have = func
            .value_type(prepared.base_ptr)
            .cloned()
            .ok_or(VectorizeError::MissingOperandType(prepared.base_ptr))?;
        if have == want {
            return Ok(prepared.base_ptr);
        }
        self.emit_value(func, |dest| IrInstruction::Cast {
            dest,
            op: CastOp::BitCast,
            src: prepared.base_ptr,
            ty: want,
        })
    }
}

/// Move the same-block users of `def` that it does not dominate, and their
/// users in turn, to just after `def`, keeping their relative order.
fn reorder_users(func: &mut IrFunction, dominance: &dyn DominanceOracle, def: InstId) {
    let Some(block) = func.block_of(def) else {
        return;
    };

    let mut visited: FxHashSet<InstId> = FxHashSet::default();
    let mut to_move = Vec::new();
    let mut worklist = vec![def];
    while let Some(current) = worklist.pop() {
        let Some(dest) = func.inst(current).and_then(|inst| inst.dest()) else {
            continue;
        };
        for user in func.users(dest) {
            // Phis and terminators already sit after everything in the block
            let ValueUser::Inst(user) = user else {
                continue;
            };
            if func.block_of(user) != Some(block) {
                continue;
            }
            let Some(pos) = func.position(user) else {
                continue;
            };
            if !dominance.dominates(func, def, user) && visited.insert(user) {
                to_move.push((pos, user));
                worklist.push(user);
            }
        }
    }

    to_move.sort_unstable();
    let mut anchor = def;
    for (_, inst) in to_move {
        if func.move_after(inst, anchor) {
            anchor = inst;
        }
    }
}

/// Remove the chain members, then address computations only they used
fn erase_members(func: &mut IrFunction, members: &[InstId]) {
    let pointers: Vec<IrId> = members
        .iter()
        .filter_map(|&id| func.inst(id).and_then(|inst| inst.pointer_operand()))
        .collect();
    for &member in members {
        func.erase_instruction(member);
    }
    for ptr in pointers {
        erase_dead_address(func, ptr);
    }
}

fn erase_dead_address(func: &mut IrFunction, mut ptr: IrId) {
    loop {
        let Some((id, inst)) = func.def_of(ptr) else {
            return;
        };
        let next = match inst {
            IrInstruction::GetElementPtr { ptr: base, .. } => *base,
            IrInstruction::Cast { op, src, ty, .. } if is_pointer_bitcast(func, *op, *src, ty) => {
                *src
            }
            _ => return,
        };
        if func.has_uses(ptr) {
            return;
        }
        func.erase_instruction(id);
        ptr = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VectorizerConfig;
    use crate::ir::analysis::{DataLayout, DefaultAnalyses};
    use crate::ir::dump::dump_function;
    use crate::ir::{BinaryOp, FunctionBuilder, IrFunctionId, MemoryEffects};

    fn rewrite(func: &mut IrFunction, chain: &[InstId], kind: AccessKind, align: u32) {
        let shape = ChainShape::analyze(func, &DataLayout::default(), chain)
            .unwrap()
            .unwrap();
        let emitter = emitter_for(kind);
        assert_eq!(emitter.kind(), kind);
        let prepared = emitter.prepare(func, chain, &shape, align).unwrap();
        let analyses = DefaultAnalyses::compute(func, &VectorizerConfig::default());
        emitter.apply(func, &analyses.context(), &prepared).unwrap();
        func.verify().unwrap();
    }

    fn count(func: &IrFunction, pred: impl Fn(&IrInstruction) -> bool) -> usize {
        func.instructions().filter(|(_, inst)| pred(inst)).count()
    }

    #[test]
    fn test_cast_selection() {
        let int = IrType::I64;
        let ptr = IrType::ptr(IrType::I8);
        assert_eq!(bit_or_pointer_cast(&int, &ptr), CastOp::IntToPtr);
        assert_eq!(bit_or_pointer_cast(&ptr, &int), CastOp::PtrToInt);
        assert_eq!(bit_or_pointer_cast(&IrType::F32, &IrType::I32), CastOp::BitCast);
    }

    #[test]
    fn test_load_pair_rewrite() {
        let mut func = IrFunction::new(IrFunctionId(0), "f", IrType::I32);
        let p = func.add_parameter("p", IrType::ptr(IrType::I32), false);
        let mut b = FunctionBuilder::new(&mut func);
        let p1 = b.build_elem_ptr(p, IrType::I32, 1).unwrap();
        let x = b.build_load(p, IrType::I32, 8).unwrap();
        // Consumes x above the last member; must end up below the new extract
        let twice = b.build_binop(BinaryOp::Add, x, x).unwrap();
        let y = b.build_load(p1, IrType::I32, 4).unwrap();
        let sum = b.build_binop(BinaryOp::Add, twice, y).unwrap();
        b.build_return(Some(sum)).unwrap();

        let chain = [func.def_inst(x).unwrap(), func.def_inst(y).unwrap()];
        rewrite(&mut func, &chain, AccessKind::Load, 8);

        let text = dump_function(&func);
        assert_eq!(count(&func, |i| i.is_load()), 1, "{}", text);
        assert!(func.def_inst(x).is_none());
        assert!(func.def_inst(p1).is_none(), "dead address kept:\n{}", text);
        let wide = func
            .instructions()
            .find_map(|(_, i)| match i {
                IrInstruction::Load { ty, align, .. } => Some((ty.clone(), *align)),
                _ => None,
            })
            .unwrap();
        assert_eq!(wide, (IrType::vector(IrType::I32, 2), 8));

        // The add that used x now follows the extract feeding it
        let twice_inst = func.def_inst(twice).unwrap();
        let IrInstruction::BinOp { left, .. } = func.inst(twice_inst).unwrap() else {
            panic!("add changed shape");
        };
        let feeder = func.def_inst(*left).unwrap();
        assert!(func.position(feeder).unwrap() < func.position(twice_inst).unwrap());
    }

    #[test]
    fn test_float_and_pointer_members() {
        let mut func = IrFunction::new(IrFunctionId(0), "f", IrType::Void);
        let slot = IrType::ptr(IrType::I8);
        let p = func.add_parameter("p", IrType::ptr(slot.clone()), false);
        let mut b = FunctionBuilder::new(&mut func);
        let p1 = b.build_elem_ptr(p, slot.clone(), 1).unwrap();
        let i64p = b.build_bitcast(p1, IrType::ptr(IrType::I64)).unwrap();
        let a = b.build_load(p, slot.clone(), 8).unwrap();
        let n = b.build_load(i64p, IrType::I64, 8).unwrap();
        b.build_call_void("use", vec![a, n], MemoryEffects::None).unwrap();
        b.build_return(None).unwrap();

        let chain = [func.def_inst(a).unwrap(), func.def_inst(n).unwrap()];
        rewrite(&mut func, &chain, AccessKind::Load, 8);

        assert_eq!(
            count(&func, |i| matches!(i, IrInstruction::Cast { op: CastOp::IntToPtr, .. })),
            1
        );
        assert_eq!(count(&func, |i| i.is_load()), 1);
    }

    #[test]
    fn test_vector_load_extracts_are_remapped() {
        let mut func = IrFunction::new(IrFunctionId(0), "f", IrType::Void);
        let v2 = IrType::vector(IrType::I16, 2);
        let p = func.add_parameter("p", IrType::ptr(v2.clone()), false);
        let mut b = FunctionBuilder::new(&mut func);
        let p1 = b.build_elem_ptr(p, v2.clone(), 1).unwrap();
        let lo = b.build_load(p, v2.clone(), 4).unwrap();
        let hi = b.build_load(p1, v2.clone(), 4).unwrap();
        let e = b.build_extract_element(hi, 1).unwrap();
        b.build_call_void("use", vec![e], MemoryEffects::None).unwrap();
        b.build_return(None).unwrap();

        let chain = [func.def_inst(lo).unwrap(), func.def_inst(hi).unwrap()];
        rewrite(&mut func, &chain, AccessKind::Load, 8);

        let lanes: Vec<u32> = func
            .instructions()
            .filter_map(|(_, i)| match i {
                IrInstruction::ExtractElement { index, .. } => index.as_const(),
                _ => None,
            })
            .collect();
        assert_eq!(lanes, vec![3]);
    }

    #[test]
    fn test_store_rewrite() {
        let mut func = IrFunction::new(IrFunctionId(0), "f", IrType::Void);
        let p = func.add_parameter("p", IrType::ptr(IrType::F32), false);
        let mut b = FunctionBuilder::new(&mut func);
        let p1 = b.build_elem_ptr(p, IrType::F32, 1).unwrap();
        let one = b.build_f32(1.0).unwrap();
        let two = b.build_f32(2.0).unwrap();
        let s1 = b.build_store(p1, two, 4).unwrap();
        let s0 = b.build_store(p, one, 4).unwrap();
        b.build_return(None).unwrap();

        rewrite(&mut func, &[s0, s1], AccessKind::Store, 8);

        assert_eq!(count(&func, |i| i.is_store()), 1);
        assert_eq!(
            count(&func, |i| matches!(i, IrInstruction::InsertElement { .. })),
            2
        );
        let stored = func
            .instructions()
            .find_map(|(_, i)| match i {
                IrInstruction::Store { ty, .. } => Some(ty.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(stored, IrType::vector(IrType::F32, 2));
    }

    #[test]
    fn test_metadata_is_merged() {
        let mut func = IrFunction::new(IrFunctionId(0), "f", IrType::Void);
        let p = func.add_parameter("p", IrType::ptr(IrType::I32), false);
        let mut b = FunctionBuilder::new(&mut func);
        let p1 = b.build_elem_ptr(p, IrType::I32, 1).unwrap();
        let tagged = AccessMetadata {
            alias_tag: Some(3),
            nontemporal: true,
            ..AccessMetadata::default()
        };
        let x = b
            .build_load_with(p, IrType::I32, 4, AccessFlags::default(), tagged.clone())
            .unwrap();
        let y = b
            .build_load_with(p1, IrType::I32, 4, AccessFlags::default(), tagged)
            .unwrap();
        b.build_call_void("use", vec![x, y], MemoryEffects::None).unwrap();
        b.build_return(None).unwrap();

        let chain = [func.def_inst(x).unwrap(), func.def_inst(y).unwrap()];
        let shape = ChainShape::analyze(&func, &DataLayout::default(), &chain)
            .unwrap()
            .unwrap();
        let prepared = LoadEmitter.prepare(&func, &chain, &shape, 4).unwrap();
        assert_eq!(prepared.metadata.alias_tag, Some(3));
        assert!(prepared.metadata.nontemporal);
        assert_eq!(prepared.anchor, chain[1]);
        assert_eq!(prepared.base_ptr, p);
    }
}
