//! Benchmarks for the optimization pipeline.
//!
//! Measures the analysis and the transformation passes on synthetic graphs:
//! - CFA over a nest of counting loops
//! - Constant folding of a long chain of constant arithmetic
//! - LICM over a loop nest with invariant arithmetic in the innermost body
//! - The full default pipeline over many graphs at once

extern crate dfgopt;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use dfgopt::prelude::*;
use std::hint::black_box;

/// A chain of `length` checked additions over constants.
fn constant_chain(length: usize) -> Graph {
    let mut builder = GraphBuilder::new(1, 0);
    let mut value = builder.int32(1);
    for i in 0..length {
        let step = builder.int32((i % 7) as i32);
        value = builder.add(
            Op::ArithAdd(ArithMode::CheckOverflow),
            [Edge::new(value, UseKind::Int32), Edge::new(step, UseKind::Int32)],
        );
    }
    builder.ret(Edge::untyped(value));
    builder.finish().unwrap()
}

/// `depth` nested counting loops. The innermost body computes `argc * argc + argc`,
/// which does not depend on any loop.
fn loop_nest(depth: usize) -> Graph {
    let mut builder = GraphBuilder::new(1, 0);
    let exit = builder.block();
    let mut after = exit;

    for level in 0..depth {
        let header = builder.block();
        let body = builder.block();
        let latch = builder.block();

        let zero = builder.int32(0);
        let phi = builder.graph_mut().add_node(Op::Phi, vec![], NodeOrigin::default());
        builder.add(Op::Upsilon { phi }, [Edge::untyped(zero)]);
        builder.jump(header);

        builder.switch_to(header);
        builder.graph_mut().append(header, phi).unwrap();
        let limit = builder.int32(4 + level as i32);
        let less = builder.add(
            Op::CompareLess,
            [Edge::new(phi, UseKind::Int32), Edge::new(limit, UseKind::Int32)],
        );
        builder.branch(Edge::new(less, UseKind::Boolean), body, after);

        builder.switch_to(latch);
        let one = builder.int32(1);
        let next = builder.add(
            Op::ArithAdd(ArithMode::CheckOverflow),
            [Edge::new(phi, UseKind::Int32), Edge::new(one, UseKind::Int32)],
        );
        builder.add(Op::Upsilon { phi }, [Edge::untyped(next)]);
        builder.jump(header);

        builder.switch_to(body);
        after = latch;
    }

    let count = builder.add(Op::GetArgumentCount, []);
    let square = builder.add(
        Op::ArithMul(ArithMode::CheckOverflow),
        [Edge::new(count, UseKind::Int32), Edge::new(count, UseKind::Int32)],
    );
    builder.add(
        Op::ArithAdd(ArithMode::CheckOverflow),
        [Edge::new(square, UseKind::Int32), Edge::new(count, UseKind::Int32)],
    );
    builder.jump(after);

    builder.switch_to(exit);
    let result = builder.int32(0);
    builder.ret(Edge::untyped(result));
    builder.finish().unwrap()
}

fn bench_cfa_loop_nest(c: &mut Criterion) {
    let ctx = CompilationContext::new();
    c.bench_function("cfa_loop_nest_6", |b| {
        b.iter_batched(
            || loop_nest(6),
            |mut graph| {
                let visits = CfaPass::analyze(&mut graph, &ctx).unwrap();
                black_box(visits)
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_fold_constant_chain(c: &mut Criterion) {
    let ctx = CompilationContext::new();
    c.bench_function("fold_constant_chain_512", |b| {
        b.iter_batched(
            || constant_chain(512),
            |mut graph| {
                CfaPass::analyze(&mut graph, &ctx).unwrap();
                let changed = ConstantFoldingPass::new().run(&mut graph, &ctx).unwrap();
                black_box(changed)
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_licm_loop_nest(c: &mut Criterion) {
    let ctx = CompilationContext::new();
    c.bench_function("licm_loop_nest_4", |b| {
        b.iter_batched(
            || loop_nest(4),
            |mut graph| {
                CfaPass::analyze(&mut graph, &ctx).unwrap();
                let changed = LicmPass::new().run(&mut graph, &ctx).unwrap();
                black_box(changed)
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_default_pipeline(c: &mut Criterion) {
    c.bench_function("default_pipeline_32_graphs", |b| {
        b.iter_batched(
            || {
                let ctx = CompilationContext::new();
                for i in 0..32 {
                    ctx.add_graph(if i % 2 == 0 { constant_chain(64) } else { loop_nest(3) });
                }
                ctx
            },
            |ctx| {
                let iterations = PassScheduler::with_default_pipeline(&ctx.config)
                    .run_pipeline(&ctx)
                    .unwrap();
                black_box(iterations)
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_cfa_loop_nest,
    bench_fold_constant_chain,
    bench_licm_loop_nest,
    bench_default_pipeline,
);
criterion_main!(benches);
