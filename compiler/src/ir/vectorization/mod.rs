//! Load/store vectorization
//!
//! Merges runs of adjacent scalar (or short vector) loads and stores within a
//! basic block into single vector accesses:
//!
//! ```text
//! %a = load f32, %p          %v = load <2 x f32>, %p.vec
//! %b = load f32, %p+4   =>   %a = extractelement %v, 0
//!                            %b = extractelement %v, 1
//! ```
//!
//! Each block is handled on its own. Accesses are grouped by the object they
//! address ([`collect`]), linked into chains of adjacent accesses
//! ([`consecutive`], [`chain`]), cut to legal widths and alignments
//! ([`legalize`]), checked against the memory operations they would be
//! reordered with ([`legality`]) and finally rewritten ([`rewrite`]).

pub mod access;
pub mod chain;
pub mod collect;
pub mod consecutive;
pub mod legality;
pub mod legalize;
pub mod rewrite;

use self::access::{AccessKind, MemoryAccess};
use self::chain::{Chain, ChainLinks};
use self::collect::collect_accesses;
use self::consecutive::is_consecutive_access;
use self::legality::check_chain;
use self::legalize::{
    plan_width, raise_alloca_alignment, resolve_alignment, AlignDecision, ChainShape, WidthPlan,
};
use self::rewrite::emitter_for;
use super::analysis::{AnalysisContext, DefaultAnalyses};
use super::dominance::post_order;
use super::dump::dump_function;
use super::optimization::{OptimizationPass, OptimizationResult};
use super::{InstId, IrFunction, IrId, IrModule};
use crate::config::VectorizerConfig;
use fxhash::FxHashSet;
use log::{debug, trace, warn};
use std::fmt;

/// Running totals of one vectorizer instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VectorizerStats {
    /// Vector loads and stores emitted
    pub vector_instructions: usize,
    /// Scalar loads and stores they replaced
    pub scalars_vectorized: usize,
}

/// A chain that breaks the vectorizer's structural assumptions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VectorizeError {
    /// An instruction handle no longer refers to a live instruction
    MissingInstruction(InstId),
    /// A chain member lies outside the range spanned by its chain
    ChainMemberOutsideRange { inst: InstId },
    NotAMemoryAccess(InstId),
    MissingOperandType(IrId),
    /// A merged vector load has a consumer other than a constant lane extract
    NonLaneUser(IrId),
    EmptyChain,
}

impl fmt::Display for VectorizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorizeError::MissingInstruction(id) => write!(f, "instruction {} does not exist", id),
            VectorizeError::ChainMemberOutsideRange { inst } => {
                write!(f, "chain member {} is outside the chain's range", inst)
            }
            VectorizeError::NotAMemoryAccess(id) => write!(f, "{} is not a load or store", id),
            VectorizeError::MissingOperandType(value) => write!(f, "no type recorded for {}", value),
            VectorizeError::NonLaneUser(value) => {
                write!(f, "{} is used other than by constant lane extracts", value)
            }
            VectorizeError::EmptyChain => write!(f, "empty chain"),
        }
    }
}

impl std::error::Error for VectorizeError {}

/// The load/store vectorizer pass
pub struct LoadStoreVectorizer {
    config: VectorizerConfig,
    stats: VectorizerStats,
}

impl Default for LoadStoreVectorizer {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadStoreVectorizer {
    pub fn new() -> Self {
        Self::with_config(VectorizerConfig::default())
    }

    pub fn with_config(config: VectorizerConfig) -> Self {
        Self {
            config,
            stats: VectorizerStats::default(),
        }
    }

    pub fn config(&self) -> &VectorizerConfig {
        &self.config
    }

    /// Totals over every function this instance has rewritten
    pub fn stats(&self) -> VectorizerStats {
        self.stats
    }

    /// Vectorize `func` using the default analyses. Returns whether it changed.
    pub fn vectorize(&mut self, func: &mut IrFunction) -> bool {
        let analyses = DefaultAnalyses::compute(func, &self.config);
        self.vectorize_with(func, &analyses.context())
    }

    /// Vectorize `func` using caller-supplied analyses
    pub fn vectorize_with(&mut self, func: &mut IrFunction, ctx: &AnalysisContext<'_>) -> bool {
        if !self.config.enabled {
            return false;
        }
        if self.config.respect_no_implicit_float && func.attributes.no_implicit_float {
            debug!("LSV: Skipping {}: no implicit float", func.name);
            return false;
        }

        let mut changed = false;
        for block in post_order(&func.cfg) {
            let collected = collect_accesses(func, block, ctx, &self.config);
            for kind in [AccessKind::Load, AccessKind::Store] {
                for group in collected.table(kind).values() {
                    changed |= self.vectorize_group(func, ctx, group, kind);
                }
            }
        }

        if changed {
            trace!("LSV: {} after vectorization:\n{}", func.name, dump_function(func));
        }
        changed
    }

    fn vectorize_group(
        &mut self,
        func: &mut IrFunction,
        ctx: &AnalysisContext<'_>,
        accesses: &[InstId],
        kind: AccessKind,
    ) -> bool {
        let mut changed = false;
        for chunk in accesses.chunks(self.config.chunk_size.max(1)) {
            changed |= self.vectorize_chunk(func, ctx, chunk, kind);
        }
        changed
    }

    fn vectorize_chunk(
        &mut self,
        func: &mut IrFunction,
        ctx: &AnalysisContext<'_>,
        chunk: &[InstId],
        kind: AccessKind,
    ) -> bool {
        if chunk.len() < 2 {
            return false;
        }

        let links = ChainLinks::build(chunk.len(), |i, j| {
            is_consecutive_access(func, ctx, chunk[i], chunk[j])
        });
        let starts: Vec<usize> = links.chain_starts().collect();

        let mut consumed: FxHashSet<InstId> = FxHashSet::default();
        let mut changed = false;
        for start in starts {
            let chain: Chain = links
                .walk(start, |i| consumed.contains(&chunk[i]))
                .into_iter()
                .map(|i| chunk[i])
                .collect();
            if chain.len() < 2 {
                continue;
            }
            changed |= self.vectorize_chain(func, ctx, &chain, kind, &mut consumed);
        }
        changed
    }

    fn vectorize_chain(
        &mut self,
        func: &mut IrFunction,
        ctx: &AnalysisContext<'_>,
        chain: &[InstId],
        kind: AccessKind,
        consumed: &mut FxHashSet<InstId>,
    ) -> bool {
        match self.try_vectorize_chain(func, ctx, chain, kind, consumed) {
            Ok(changed) => changed,
            Err(err) => {
                warn!("LSV: Skipping {} chain of {}: {}", kind.name(), func.name, err);
                false
            }
        }
    }

    fn try_vectorize_chain(
        &mut self,
        func: &mut IrFunction,
        ctx: &AnalysisContext<'_>,
        chain: &[InstId],
        kind: AccessKind,
        consumed: &mut FxHashSet<InstId>,
    ) -> Result<bool, VectorizeError> {
        let Some(shape) = ChainShape::analyze(func, ctx.layout, chain)? else {
            debug!("LSV: Chain mixes vector and scalar elements");
            return Ok(false);
        };

        let register_bits = ctx.target.register_width_bits(shape.addr_space);
        match plan_width(shape.element_bits, chain.len(), register_bits) {
            WidthPlan::Accept => {}
            WidthPlan::Reject => {
                debug!(
                    "LSV: Chain of {} x {}-bit elements does not fit a {}-bit register",
                    chain.len(),
                    shape.element_bits,
                    register_bits
                );
                return Ok(false);
            }
            WidthPlan::DropLast => {
                debug!("LSV: Dropping the last element of a 3-byte chain");
                let rest = &chain[..chain.len() - 1];
                return Ok(self.vectorize_chain(func, ctx, rest, kind, consumed));
            }
            WidthPlan::SplitAt(at) => {
                debug!("LSV: Splitting chain of {} at {}", chain.len(), at);
                let (left, right) = chain.split_at(at);
                let left = self.vectorize_chain(func, ctx, left, kind, consumed);
                let right = self.vectorize_chain(func, ctx, right, kind, consumed);
                return Ok(left | right);
            }
        }

        let first = MemoryAccess::from_inst(func, chain[0])
            .ok_or(VectorizeError::NotAMemoryAccess(chain[0]))?;
        let total_bytes = shape.element_bytes() * chain.len() as u64;
        let decision = resolve_alignment(
            func,
            ctx.layout,
            &first,
            total_bytes,
            self.config.target_base_align,
        );
        let Some(align) = decision.align() else {
            debug!("LSV: Chain of {} bytes is misaligned", total_bytes);
            return Ok(false);
        };

        if !check_chain(func, ctx, chain, kind)? {
            return Ok(false);
        }

        let emitter = emitter_for(kind);
        let prepared = emitter.prepare(func, chain, &shape, align)?;
        if let AlignDecision::RaiseAlloca { alloca, align } = decision {
            debug!("LSV: Raising alignment of {} to {}", alloca, align);
            raise_alloca_alignment(func, alloca, align);
        }
        emitter.apply(func, ctx, &prepared)?;

        consumed.extend(chain.iter().copied());
        self.stats.vector_instructions += 1;
        self.stats.scalars_vectorized += chain.len();
        debug!(
            "LSV: Vectorized {} {}s into {}",
            chain.len(),
            kind.name(),
            prepared.vector_ty
        );
        Ok(true)
    }
}

impl OptimizationPass for LoadStoreVectorizer {
    fn name(&self) -> &'static str {
        "load-store-vectorizer"
    }

    fn run_on_module(&mut self, module: &mut IrModule) -> OptimizationResult {
        // Escape hatch for bisecting miscompiles
        if std::env::var("LSV_DISABLE").is_ok() {
            return OptimizationResult::unchanged();
        }

        let mut result = OptimizationResult::unchanged();
        for id in module.function_ids() {
            if let Some(function) = module.get_function_mut(id) {
                result = result.combine(self.run_on_function(function));
            }
        }
        result
    }

    fn run_on_function(&mut self, function: &mut IrFunction) -> OptimizationResult {
        let before = self.stats;
        if !self.vectorize(function) {
            return OptimizationResult::unchanged();
        }

        let vector_instructions = self.stats.vector_instructions - before.vector_instructions;
        let scalars_vectorized = self.stats.scalars_vectorized - before.scalars_vectorized;
        let mut result = OptimizationResult::changed();
        result.instructions_eliminated = scalars_vectorized.saturating_sub(vector_instructions);
        result.bump("vector_instructions", vector_instructions);
        result.bump("scalars_vectorized", scalars_vectorized);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::analysis::DominanceOracle;
    use crate::ir::{FunctionBuilder, IrFunctionId, IrType};
    use std::cell::Cell;

    /// Two adjacent i32 loads from `p` whose results are returned as a sum
    fn pair_of_loads() -> IrFunction {
        let mut func = IrFunction::new(IrFunctionId(0), "pair", IrType::I32);
        let p = func.add_parameter("p", IrType::ptr(IrType::I32), false);
        let mut b = FunctionBuilder::new(&mut func);
        let p1 = b.build_elem_ptr(p, IrType::I32, 1).unwrap();
        let x = b.build_load(p, IrType::I32, 8).unwrap();
        let y = b.build_load(p1, IrType::I32, 4).unwrap();
        let sum = b.build_binop(crate::ir::BinaryOp::Add, x, y).unwrap();
        b.build_return(Some(sum)).unwrap();
        func
    }

    fn load_count(func: &IrFunction) -> usize {
        func.instructions().filter(|(_, i)| i.is_load()).count()
    }

    #[test]
    fn test_vectorize_pair() {
        let mut func = pair_of_loads();
        let mut lsv = LoadStoreVectorizer::new();
        assert!(lsv.vectorize(&mut func));
        assert_eq!(load_count(&func), 1);
        assert_eq!(
            lsv.stats(),
            VectorizerStats {
                vector_instructions: 1,
                scalars_vectorized: 2,
            }
        );
        func.verify().unwrap();

        // Nothing left to merge
        assert!(!lsv.vectorize(&mut func));
        assert_eq!(lsv.stats().vector_instructions, 1);
    }

    #[test]
    fn test_disabled() {
        let mut func = pair_of_loads();
        let mut lsv = LoadStoreVectorizer::with_config(VectorizerConfig {
            enabled: false,
            ..VectorizerConfig::default()
        });
        assert!(!lsv.vectorize(&mut func));
        assert_eq!(load_count(&func), 2);
    }

    #[test]
    fn test_no_implicit_float() {
        let mut func = pair_of_loads();
        func.attributes.no_implicit_float = true;
        assert!(!LoadStoreVectorizer::new().vectorize(&mut func));

        let mut lsv = LoadStoreVectorizer::with_config(VectorizerConfig {
            respect_no_implicit_float: false,
            ..VectorizerConfig::default()
        });
        assert!(lsv.vectorize(&mut func));
    }

    #[test]
    fn test_run_on_function_reports_counters() {
        let mut func = pair_of_loads();
        let mut lsv = LoadStoreVectorizer::new();
        let result = lsv.run_on_function(&mut func);
        assert!(result.modified);
        assert_eq!(result.stat("vector_instructions"), 1);
        assert_eq!(result.stat("scalars_vectorized"), 2);
        assert_eq!(result.instructions_eliminated, 1);
        assert_eq!(lsv.name(), "load-store-vectorizer");
    }

    /// Counts the queries made against the default oracle
    struct CountingDominance<'a> {
        inner: &'a dyn DominanceOracle,
        queries: Cell<usize>,
    }

    impl DominanceOracle for CountingDominance<'_> {
        fn dominates(&self, func: &IrFunction, def: InstId, user: InstId) -> bool {
            self.queries.set(self.queries.get() + 1);
            self.inner.dominates(func, def, user)
        }
    }

    #[test]
    fn test_reorder_uses_dominance_oracle() {
        let mut func = IrFunction::new(IrFunctionId(0), "early_use", IrType::I32);
        let p = func.add_parameter("p", IrType::ptr(IrType::I32), false);
        let mut b = FunctionBuilder::new(&mut func);
        let p1 = b.build_elem_ptr(p, IrType::I32, 1).unwrap();
        let x = b.build_load(p, IrType::I32, 8).unwrap();
        let twice = b.build_binop(crate::ir::BinaryOp::Add, x, x).unwrap();
        let y = b.build_load(p1, IrType::I32, 4).unwrap();
        let sum = b.build_binop(crate::ir::BinaryOp::Add, twice, y).unwrap();
        b.build_return(Some(sum)).unwrap();

        let analyses = DefaultAnalyses::compute(&func, &VectorizerConfig::default());
        let dominance = CountingDominance {
            inner: &analyses.dominance,
            queries: Cell::new(0),
        };
        let ctx = AnalysisContext {
            dominance: &dominance,
            ..analyses.context()
        };

        let mut lsv = LoadStoreVectorizer::new();
        assert!(lsv.vectorize_with(&mut func, &ctx));
        func.verify().unwrap();
        assert!(dominance.queries.get() > 0);

        // The add now follows the vector load it reads from
        let wide = func
            .block_instructions(func.entry_block())
            .iter()
            .copied()
            .find(|&id| func.inst(id).is_some_and(|inst| inst.is_load()))
            .unwrap();
        let add = func.def_inst(twice).unwrap();
        assert!(analyses.dominance.dominates(&func, wide, add));
    }

    #[test]
    fn test_error_display() {
        let err = VectorizeError::ChainMemberOutsideRange { inst: InstId(4) };
        assert_eq!(err.to_string(), "chain member #4 is outside the chain's range");
        assert_eq!(
            VectorizeError::NotAMemoryAccess(InstId(2)).to_string(),
            "#2 is not a load or store"
        );
    }
}
