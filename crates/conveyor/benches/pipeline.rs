use conveyor::ObjectProcessor;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Duration;
use tokio::runtime::Runtime;

const VALUES: u64 = 512;

fn bench_batched(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("batched_pipeline");
    group.throughput(Throughput::Elements(VALUES));

    for max_size in [1_usize, 16, 128] {
        let processor = runtime.block_on(async {
            ObjectProcessor::builder()
                .map(|n: u64| n.wrapping_mul(31))
                .batched(max_size, Duration::from_millis(1))
                .map(|n| n.count_ones())
                .sequential()
                .unwrap()
                .build()
        });

        group.bench_with_input(BenchmarkId::from_parameter(max_size), &processor, |b, processor| {
            b.to_async(&runtime).iter(|| async {
                let handles: Vec<_> = (0..VALUES).map(|n| processor.apply(black_box(n))).collect();
                for handle in handles {
                    black_box(handle.await.unwrap());
                }
            });
        });

        runtime.block_on(processor.shutdown());
    }
    group.finish();
}

fn bench_sequential(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let processor = runtime.block_on(async {
        ObjectProcessor::builder().map(|s: String| s.len()).map(|n| n * 2).build()
    });

    c.bench_function("sequential_process", |b| {
        b.to_async(&runtime).iter(|| async {
            black_box(processor.process(black_box("ascii-example".to_owned())).await.unwrap())
        });
    });
}

criterion_group!(benches, bench_batched, bench_sequential);
criterion_main!(benches);
