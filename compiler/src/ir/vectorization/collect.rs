//! Gathering vectorization candidates from one block

use super::access::{AccessKind, MemoryAccess};
use crate::config::VectorizerConfig;
use crate::ir::analysis::value_tracking::underlying_object;
use crate::ir::analysis::AnalysisContext;
use crate::ir::{InstId, IrBlockId, IrFunction, IrId, IrInstruction, ValueUser};
use fxhash::FxBuildHasher;
use indexmap::IndexMap;
use log::debug;

/// Accesses of one kind keyed by underlying object, both in program order
pub type AccessTable = IndexMap<IrId, Vec<InstId>, FxBuildHasher>;

#[derive(Debug, Default)]
pub struct CollectedAccesses {
    pub loads: AccessTable,
    pub stores: AccessTable,
}

impl CollectedAccesses {
    pub fn table(&self, kind: AccessKind) -> &AccessTable {
        match kind {
            AccessKind::Load => &self.loads,
            AccessKind::Store => &self.stores,
        }
    }
}

/// Scan `block` for loads and stores the vectorizer may combine
pub fn collect_accesses(
    func: &IrFunction,
    block: IrBlockId,
    ctx: &AnalysisContext<'_>,
    config: &VectorizerConfig,
) -> CollectedAccesses {
    let mut collected = CollectedAccesses::default();

    for &id in func.block_instructions(block) {
        let Some(inst) = func.inst(id) else {
            continue;
        };
        if !inst.may_read_or_write_memory() {
            continue;
        }
        let Some(access) = MemoryAccess::from_inst(func, id) else {
            continue;
        };
        if !is_candidate(func, &access, ctx) {
            continue;
        }

        let object = underlying_object(func, access.ptr, config.max_underlying_object_depth);
        let table = match access.kind {
            AccessKind::Load => &mut collected.loads,
            AccessKind::Store => &mut collected.stores,
        };
        table.entry(object).or_default().push(id);
    }

    debug!(
        "LSV: {} has {} load groups and {} store groups",
        block,
        collected.loads.len(),
        collected.stores.len()
    );
    collected
}

fn is_candidate(func: &IrFunction, access: &MemoryAccess, ctx: &AnalysisContext<'_>) -> bool {
    if !access.simple {
        return false;
    }
    if !access.ty.scalar_type().is_valid_lane_type() {
        return false;
    }

    // Sub-byte accesses are not worth the trouble
    let bits = ctx.layout.type_size_bits(&access.ty);
    if bits < 8 {
        return false;
    }
    let register_bits = u64::from(ctx.target.register_width_bits(access.addr_space));
    if bits > register_bits / 2 {
        return false;
    }

    if access.kind == AccessKind::Load && access.ty.is_vector() {
        return only_constant_lane_users(func, access);
    }
    true
}

/// A vector load can only be merged when it is consumed lane by lane
fn only_constant_lane_users(func: &IrFunction, access: &MemoryAccess) -> bool {
    let Some(value) = access.value(func) else {
        return false;
    };
    func.users(value).into_iter().all(|user| match user {
        ValueUser::Inst(id) => matches!(
            func.inst(id),
            Some(IrInstruction::ExtractElement {
                vector,
                index: crate::ir::LaneIndex::Const(_),
                ..
            }) if *vector == value
        ),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::analysis::DefaultAnalyses;
    use crate::ir::{AccessFlags, AccessMetadata, FunctionBuilder, IrFunctionId, IrType};

    #[test]
    fn test_grouping_and_filters() {
        let mut func = IrFunction::new(IrFunctionId(0), "f", IrType::Void);
        let p = func.add_parameter("p", IrType::ptr(IrType::I32), false);
        let q = func.add_parameter("q", IrType::ptr(IrType::I32), false);
        let mut b = FunctionBuilder::new(&mut func);
        let p1 = b.build_elem_ptr(p, IrType::I32, 1).unwrap();
        let a = b.build_load(p, IrType::I32, 4).unwrap();
        let c = b.build_load(q, IrType::I32, 4).unwrap();
        let d = b.build_load(p1, IrType::I32, 4).unwrap();
        b.build_load_with(
            p,
            IrType::I32,
            4,
            AccessFlags {
                volatile: true,
                atomic: false,
            },
            AccessMetadata::default(),
        )
        .unwrap();
        let bp = b.build_bitcast(p, IrType::ptr(IrType::Bool)).unwrap();
        b.build_load(bp, IrType::Bool, 1).unwrap();
        b.build_store(q, a, 4).unwrap();
        b.build_return(None).unwrap();

        let config = VectorizerConfig::default();
        let analyses = DefaultAnalyses::compute(&func, &config);
        let collected = collect_accesses(&func, func.entry_block(), &analyses.context(), &config);

        let loads: Vec<_> = collected.loads.iter().collect();
        assert_eq!(loads.len(), 2);
        assert_eq!(*loads[0].0, p);
        assert_eq!(
            loads[0].1,
            &vec![func.def_inst(a).unwrap(), func.def_inst(d).unwrap()]
        );
        assert_eq!(*loads[1].0, q);
        assert_eq!(loads[1].1, &vec![func.def_inst(c).unwrap()]);
        assert_eq!(collected.table(AccessKind::Store).len(), 1);
    }

    #[test]
    fn test_vector_load_users() {
        let mut func = IrFunction::new(IrFunctionId(0), "f", IrType::Void);
        let v2 = IrType::vector(IrType::I16, 2);
        let p = func.add_parameter("p", IrType::ptr(v2.clone()), false);
        let out = func.add_parameter("out", IrType::ptr(v2.clone()), false);
        let mut b = FunctionBuilder::new(&mut func);
        let lanes = b.build_load(p, v2.clone(), 4).unwrap();
        b.build_extract_element(lanes, 0).unwrap();
        let whole = b.build_load(p, v2, 4).unwrap();
        b.build_store(out, whole, 4).unwrap();
        b.build_return(None).unwrap();

        let config = VectorizerConfig::default();
        let analyses = DefaultAnalyses::compute(&func, &config);
        let collected = collect_accesses(&func, func.entry_block(), &analyses.context(), &config);
        assert_eq!(collected.loads[&p], vec![func.def_inst(lanes).unwrap()]);
    }

    #[test]
    fn test_wide_accesses_are_skipped() {
        let mut func = IrFunction::new(IrFunctionId(0), "f", IrType::Void);
        let p = func.add_parameter("p", IrType::ptr(IrType::I64), false);
        let mut b = FunctionBuilder::new(&mut func);
        b.build_load(p, IrType::I64, 8).unwrap();
        b.build_return(None).unwrap();

        let config = VectorizerConfig {
            default_register_bits: 64,
            ..VectorizerConfig::default()
        };
        let analyses = DefaultAnalyses::compute(&func, &config);
        let collected = collect_accesses(&func, func.entry_block(), &analyses.context(), &config);
        assert!(collected.loads.is_empty());
    }
}
