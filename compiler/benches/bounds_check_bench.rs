//! Benchmarks for bounds-check instrumentation and instrumented execution

use coco_compiler::codegen::{InterpValue, MirInterpreter};
use coco_compiler::ir::bounds_check::BoundsCheckPass;
use coco_compiler::ir::{CompareOp, FunctionSignatureBuilder, IrBuilder, IrModule, IrType};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// `count` functions, each walking a pointer over a 64-element array and
/// handing it to a helper that indexes it
fn generate_module(count: usize) -> IrModule {
    let mut builder = IrBuilder::new("bench".to_string(), "bench.coco".to_string());

    let sig = FunctionSignatureBuilder::new()
        .param("p", IrType::ptr(IrType::I32))
        .param("i", IrType::I32)
        .build();
    let touch = builder.start_function("touch".to_string(), sig);
    let p = builder.param(0).unwrap();
    let i = builder.param(1).unwrap();
    let slot = builder.build_gep(p, vec![i], IrType::I32).unwrap();
    builder.build_store(slot, i).unwrap();
    builder.build_return(None).unwrap();
    builder.finish_function();

    for n in 0..count {
        let sig = FunctionSignatureBuilder::new()
            .param("n", IrType::I32)
            .returns(IrType::I32)
            .build();
        builder.start_function(format!("walk{}", n), sig);
        let limit = builder.param(0).unwrap();
        let entry = builder.current_block().unwrap();
        let size = builder.build_int(64, IrType::I32).unwrap();
        let zero = builder.build_int(0, IrType::I32).unwrap();
        let one = builder.build_int(1, IrType::I32).unwrap();
        let arr = builder.build_alloc(IrType::I32, Some(size)).unwrap();
        let head = builder.create_block().unwrap();
        let body = builder.create_block().unwrap();
        let exit = builder.create_block().unwrap();
        builder.build_branch(head).unwrap();

        builder.switch_to_block(head);
        let cursor = builder.build_phi(head, IrType::ptr(IrType::I32)).unwrap();
        let i = builder.build_phi(head, IrType::I32).unwrap();
        let more = builder.build_cmp(CompareOp::Lt, i, limit).unwrap();
        builder.build_cond_branch(more, body, exit).unwrap();

        builder.switch_to_block(body);
        let slot = builder.build_gep(cursor, vec![zero], IrType::I32).unwrap();
        builder.build_store(slot, i).unwrap();
        builder.build_call_void(touch, vec![arr, i]).unwrap();
        let next = builder.build_gep(cursor, vec![one], IrType::I32).unwrap();
        let next_i = builder.build_add(i, one).unwrap();
        builder.build_branch(head).unwrap();

        builder.add_phi_incoming(head, cursor, entry, arr).unwrap();
        builder.add_phi_incoming(head, cursor, body, next).unwrap();
        builder.add_phi_incoming(head, i, entry, zero).unwrap();
        builder.add_phi_incoming(head, i, body, next_i).unwrap();

        builder.switch_to_block(exit);
        builder.build_return(Some(i)).unwrap();
        builder.finish_function();
    }

    builder.finish()
}

/// One function with `count` accesses, each a two-hop chain off the same array
fn generate_long_function(count: usize) -> IrModule {
    let mut builder = IrBuilder::new("bench".to_string(), "bench.coco".to_string());
    let sig = FunctionSignatureBuilder::new().param("i", IrType::I32).build();
    builder.start_function("long".to_string(), sig);
    let i = builder.param(0).unwrap();
    let len = builder.build_int(count as i64 + 1, IrType::I32).unwrap();
    let one = builder.build_int(1, IrType::I32).unwrap();
    let arr = builder.build_alloc(IrType::I32, Some(len)).unwrap();
    for _ in 0..count {
        let row = builder.build_gep(arr, vec![i], IrType::I32).unwrap();
        let slot = builder.build_gep(row, vec![one], IrType::I32).unwrap();
        builder.build_store(slot, i).unwrap();
    }
    builder.build_return(None).unwrap();
    builder.finish_function();
    builder.finish()
}

fn bench_instrumentation(c: &mut Criterion) {
    let mut group = c.benchmark_group("instrument");

    for count in [10, 100, 500] {
        let module = generate_module(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &module, |b, module| {
            b.iter_batched(
                || module.clone(),
                |mut module| {
                    BoundsCheckPass::new().instrument(&mut module).unwrap();
                    black_box(module)
                },
                criterion::BatchSize::LargeInput,
            )
        });
    }

    group.finish();

    let mut group = c.benchmark_group("instrument_one_function");
    for count in [100, 1_000, 5_000] {
        let module = generate_long_function(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &module, |b, module| {
            b.iter_batched(
                || module.clone(),
                |mut module| {
                    BoundsCheckPass::new().instrument(&mut module).unwrap();
                    black_box(module)
                },
                criterion::BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

fn bench_checked_execution(c: &mut Criterion) {
    let plain = generate_module(1);
    let mut checked = plain.clone();
    BoundsCheckPass::new().instrument(&mut checked).unwrap();

    let mut group = c.benchmark_group("execute_walk");
    for (label, module) in [("plain", &plain), ("checked", &checked)] {
        let id = module.function_by_name("walk0").unwrap().id;
        group.bench_function(label, |b| {
            b.iter(|| {
                let mut interp = MirInterpreter::new();
                black_box(interp.execute(module, id, &[InterpValue::Int(63)]).unwrap())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_instrumentation, bench_checked_execution);
criterion_main!(benches);
