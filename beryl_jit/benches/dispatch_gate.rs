//! Dispatch-gate benchmarks.
//!
//! The two reads compiled code performs on every call: the `jit_func`
//! cell load deciding native vs. interpreted dispatch, and the
//! class-serial guard lookup. Both must stay nanosecond-scale.

use beryl_core::{ClassSerial, CodePtr, JitFuncCell};
use beryl_jit::serials::ValidSerials;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_jit_func_load(c: &mut Criterion) {
    let cell = JitFuncCell::new();
    cell.set_not_ready();
    cell.publish(CodePtr(0x1000));

    c.bench_function("jit_func_load", |b| {
        b.iter(|| black_box(&cell).load())
    });
}

fn bench_serial_guard(c: &mut Criterion) {
    let serials = ValidSerials::new();
    for raw in 0..4096 {
        serials.insert(ClassSerial(raw));
    }

    let mut group = c.benchmark_group("serial_guard");
    group.bench_function("hit", |b| {
        b.iter(|| black_box(&serials).contains(ClassSerial(2048)))
    });
    group.bench_function("miss", |b| {
        b.iter(|| black_box(&serials).contains(ClassSerial(1 << 40)))
    });
    group.finish();
}

criterion_group!(benches, bench_jit_func_load, bench_serial_guard);
criterion_main!(benches);
