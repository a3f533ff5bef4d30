#[macro_use]
extern crate criterion;

use criterion::{black_box, Criterion};
use urverk_core::{ContextConfig, ContextMode, Kernel};

fn benchmark_round_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_rounds");

    for actors in [4, 16, 64] {
        group.throughput(criterion::Throughput::Elements(actors as u64));
        group.bench_function(format!("serial_yield_{}", actors), |b| {
            b.iter(|| {
                let mut kernel = Kernel::new(&ContextConfig::default()).unwrap();
                for n in 0..actors {
                    kernel
                        .spawn(&format!("bench-{n}"), |cx| {
                            for _ in 0..16 {
                                cx.yield_now();
                            }
                        })
                        .unwrap();
                }
                black_box(kernel.run().unwrap());
            });
        });
    }

    group.bench_function("parallel_yield_16", |b| {
        b.iter(|| {
            let mut kernel = Kernel::new(&ContextConfig {
                mode: ContextMode::Parallel,
                workers: 4,
                ..ContextConfig::default()
            })
            .unwrap();
            for n in 0..16 {
                kernel
                    .spawn(&format!("bench-{n}"), |cx| {
                        for _ in 0..16 {
                            cx.yield_now();
                        }
                    })
                    .unwrap();
            }
            black_box(kernel.run().unwrap());
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_round_throughput);
criterion_main!(benches);
