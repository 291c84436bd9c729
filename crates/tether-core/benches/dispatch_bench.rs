//! Dispatch-path benchmarks: steady-state fan-out, one-shot churn, and
//! structural lookup.

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use tether_core::{Callable, HandlerRegistry, Value};

fn bench_dispatch_fanout(c: &mut Criterion) {
    let registry = HandlerRegistry::new();
    for _ in 0..64 {
        registry.append(Callable::new(|invocation| {
            black_box(invocation.args.len());
        }));
    }
    let payload = Value::List(vec![Value::Int(1)]);

    c.bench_function("dispatch_64_handlers_structured_payload", |b| {
        b.iter(|| registry.dispatch(Some(black_box(&payload))));
    });
}

fn bench_one_shot_churn(c: &mut Criterion) {
    c.bench_function("dispatch_32_one_shot_handlers", |b| {
        b.iter(|| {
            let registry = HandlerRegistry::new();
            for _ in 0..32 {
                registry.append(Callable::new(|_| {}).once());
            }
            registry.dispatch(None);
            black_box(registry.len())
        });
    });
}

fn bench_structural_lookup(c: &mut Criterion) {
    let registry = HandlerRegistry::new();
    for i in 0..64 {
        registry.append(Callable::new(|_| {}).with_args([Value::Int(i)]));
    }
    let needle = Callable::new(|_| {}).with_args([Value::Int(63)]);

    c.bench_function("index_of_miss_in_64", |b| {
        // Distinct function: always a full-scan miss.
        b.iter(|| black_box(registry.index_of(&needle)));
    });
}

criterion_group!(
    benches,
    bench_dispatch_fanout,
    bench_one_shot_churn,
    bench_structural_lookup
);
criterion_main!(benches);
