//! Drain Throughput Benchmarks
//!
//! Measures how fast the batch drain loop consumes an in-memory stream.
//!
//! ## Benchmarks
//!
//! ### 1. Batch Size (`bench_drain_batch_size`)
//! - Drains 100,000 prefilled records
//! - Tests batch sizes 100, 1,000 and 10,000
//!
//! ### 2. Resume (`bench_resume_open`)
//! - Measures opening at a cursor deep in the log and reading one batch
//!
//! ### 3. Progress Reporting (`bench_reporter_observe`)
//! - Measures the per-batch cost of the throughput reporter
//!
//! ## Running
//!
//! ```bash
//! cargo bench -p streamdrain-core --bench drain_bench
//!
//! # Run a specific group
//! cargo bench -p streamdrain-core --bench drain_bench drain_batch_size
//! ```

use std::time::Duration;

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use streamdrain_core::{
    BatchDrain, DrainConfig, IdlePolicy, MemoryLog, MemoryStreamSource, Position, StreamHandle,
    StreamSource, ThroughputReporter,
};

const RECORDS: u64 = 100_000;

fn prefilled_log(records: u64, value_size: usize) -> MemoryLog {
    let log = MemoryLog::new();
    let value = Bytes::from(vec![b'x'; value_size]);
    log.append_batch((0..records).map(|_| (None, value.clone())));
    log
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn bench_drain_batch_size(c: &mut Criterion) {
    let rt = runtime();
    let log = prefilled_log(RECORDS, 128);
    let source = MemoryStreamSource::new("bench", log).with_idle_timeout(Duration::from_millis(1));

    let mut group = c.benchmark_group("drain_batch_size");
    group.throughput(Throughput::Elements(RECORDS));
    group.sample_size(20);

    for batch_size in [100usize, 1_000, 10_000] {
        let config = DrainConfig {
            max_batch_size: batch_size,
            idle_timeout_ms: None,
            idle_policy: IdlePolicy::KeepWaiting,
        };
        group.bench_with_input(BenchmarkId::new("batch", batch_size), &config, |b, config| {
            b.iter(|| {
                rt.block_on(async {
                    let mut handle = source.open(None).await.unwrap();
                    let mut drain = BatchDrain::new(&mut *handle, RECORDS, config.clone());
                    let end = drain.drain_all(|batch, _| {
                        black_box(batch.len());
                    });
                    black_box(end.await.unwrap());
                })
            });
        });
    }

    group.finish();
}

fn bench_resume_open(c: &mut Criterion) {
    let rt = runtime();
    let log = prefilled_log(RECORDS, 64);
    let source = MemoryStreamSource::new("bench", log);
    let cursor = Position::from_u64(RECORDS - 1_000);

    c.bench_function("resume_open_and_read", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut handle = source.open(Some(&cursor)).await.unwrap();
                black_box(handle.read_up_to(1_000).await.unwrap().len());
            })
        });
    });
}

fn bench_reporter_observe(c: &mut Criterion) {
    let mut group = c.benchmark_group("reporter_observe");
    group.throughput(Throughput::Elements(10_000));

    group.bench_function("10k_batches", |b| {
        b.iter(|| {
            let mut reporter = ThroughputReporter::new(100_000);
            let mut samples = 0;
            for i in 1..=10_000u64 {
                if reporter.observe_at(i * 100, Duration::from_millis(i)).is_some() {
                    samples += 1;
                }
            }
            black_box(samples);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_drain_batch_size,
    bench_resume_open,
    bench_reporter_observe
);
criterion_main!(benches);
