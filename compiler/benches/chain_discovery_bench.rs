//! Benchmarks for chain discovery and the full vectorizer run

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lsv_compiler::ir::analysis::DefaultAnalyses;
use lsv_compiler::ir::vectorization::chain::ChainLinks;
use lsv_compiler::ir::vectorization::consecutive::is_consecutive_access;
use lsv_compiler::ir::{
    BinaryOp, FunctionBuilder, InstId, IrFunction, IrFunctionId, IrId, IrType,
};
use lsv_compiler::{LoadStoreVectorizer, VectorizerConfig};

/// `count` i32 loads from `p`, visited in a scrambled but deterministic order,
/// summed into the return value
fn scrambled_loads(count: usize) -> IrFunction {
    let mut func = IrFunction::new(IrFunctionId(0), "loads", IrType::I32);
    let p = func.add_parameter("p", IrType::ptr(IrType::I32), false);
    let mut b = FunctionBuilder::new(&mut func);

    let mut values: Vec<IrId> = Vec::with_capacity(count);
    for i in 0..count {
        // 7 is coprime with every power of two count
        let index = (i * 7) % count;
        let ptr = b.build_elem_ptr(p, IrType::I32, index as i64).unwrap();
        let align = if index % 4 == 0 { 16 } else { 4 };
        values.push(b.build_load(ptr, IrType::I32, align).unwrap());
    }
    let mut sum = values[0];
    for &v in &values[1..] {
        sum = b.build_binop(BinaryOp::Add, sum, v).unwrap();
    }
    b.build_return(Some(sum)).unwrap();
    func
}

fn load_ids(func: &IrFunction) -> Vec<InstId> {
    func.block_instructions(func.entry_block())
        .iter()
        .copied()
        .filter(|&id| func.inst(id).is_some_and(|inst| inst.is_load()))
        .collect()
}

fn bench_chain_links(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_links");
    let config = VectorizerConfig::default();

    for count in [8, 32, 64] {
        let func = scrambled_loads(count);
        let analyses = DefaultAnalyses::compute(&func, &config);
        let ctx = analyses.context();
        let loads = load_ids(&func);

        group.bench_with_input(BenchmarkId::from_parameter(count), &loads, |b, loads| {
            b.iter(|| {
                let links = ChainLinks::build(loads.len(), |i, j| {
                    is_consecutive_access(&func, &ctx, loads[i], loads[j])
                });
                black_box(links.chain_starts().count())
            });
        });
    }

    group.finish();
}

fn bench_vectorize(c: &mut Criterion) {
    let mut group = c.benchmark_group("vectorize");

    for count in [16, 64, 256] {
        let func = scrambled_loads(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &func, |b, func| {
            b.iter(|| {
                let mut copy = func.clone();
                let mut lsv = LoadStoreVectorizer::new();
                black_box(lsv.vectorize(&mut copy));
                black_box(lsv.stats())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_chain_links, bench_vectorize);
criterion_main!(benches);
