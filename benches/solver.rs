//! Benchmarks for the worklist-based analyses.
//!
//! Measures the analyses on synthetic units of growing size:
//! - Origin tracking over a long chain of local copies
//! - Liveness and flush planning over many statements inside a loop
//! - Region partitioning of a unit with many subroutine calls

extern crate flowscope;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use flowscope::prelude::*;
use std::hint::black_box;

/// x0 = new; x1 = x0; ...; return x(n-1)
fn copy_chain(len: u16) -> InstructionGraph {
    let mut asm = CodeAssembler::new();
    let vars: Vec<VarId> = (0..len).map(|slot| asm.local(slot)).collect();
    asm.new_object().unwrap().store(vars[0]).unwrap();
    for pair in vars.windows(2) {
        asm.load(pair[0])
            .unwrap()
            .store(pair[1])
            .unwrap()
            .statement()
            .unwrap();
    }
    asm.load(vars[vars.len() - 1]).unwrap().ret_value().unwrap();
    asm.finish().unwrap()
}

/// A loop whose body assigns and reads `vars` variables, one statement each.
fn statement_loop(vars: u16) -> InstructionGraph {
    let mut asm = CodeAssembler::new();
    let locals: Vec<VarId> = (0..vars).map(|slot| asm.local(slot)).collect();
    asm.label("head").unwrap();
    for (i, &var) in locals.iter().enumerate() {
        asm.push_const().unwrap().store(var).unwrap().statement().unwrap();
        if i > 0 {
            asm.load(locals[i - 1]).unwrap().pop().unwrap();
        }
    }
    asm.push_const()
        .unwrap()
        .if_true("head")
        .unwrap()
        .ret_void()
        .unwrap();
    asm.finish().unwrap()
}

/// A main body calling `count` distinct subroutines.
fn subroutines(count: u16) -> InstructionGraph {
    let mut asm = CodeAssembler::new();
    let addr = asm.local(0);
    let names: Vec<String> = (0..count).map(|i| format!("sub{i}")).collect();
    for name in &names {
        asm.jsr(name).unwrap();
    }
    asm.ret_void().unwrap();
    for name in &names {
        asm.label(name).unwrap().store(addr).unwrap().ret(0).unwrap();
    }
    asm.finish().unwrap()
}

fn bench_origins(c: &mut Criterion) {
    let config = AnalysisConfig::default();
    let mut group = c.benchmark_group("origins");
    for len in [16u16, 128, 1024] {
        let graph = copy_chain(len);
        let frames = FrameSimulator::compute_frames(&graph, usize::from(len)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(len), &graph, |b, graph| {
            b.iter(|| {
                let origins = OriginTracker::new(black_box(graph), &config)
                    .result_origins(&frames)
                    .unwrap();
                black_box(origins)
            });
        });
    }
    group.finish();
}

fn bench_liveness(c: &mut Criterion) {
    let config = AnalysisConfig::default();
    let mut group = c.benchmark_group("flush_plan");
    for vars in [8u16, 64, 256] {
        let graph = statement_loop(vars);
        group.bench_with_input(BenchmarkId::from_parameter(vars), &graph, |b, graph| {
            b.iter(|| {
                let plan = LivenessAnalyzer::new(black_box(graph), &config)
                    .flush_plan()
                    .unwrap();
                black_box(plan)
            });
        });
    }
    group.finish();
}

fn bench_regions(c: &mut Criterion) {
    let graph = subroutines(256);
    c.bench_function("partition_256_subroutines", |b| {
        b.iter(|| {
            let map = RegionFinder::partition(black_box(&graph)).unwrap();
            black_box(map)
        });
    });
}

criterion_group!(benches, bench_origins, bench_liveness, bench_regions);
criterion_main!(benches);
