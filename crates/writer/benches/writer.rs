//! Batching writer benchmark suite
//!
//! Run with: `cargo bench -p tell-writer --bench writer`
//!
//! # What we measure
//!
//! - Buffer pool acquire/release cycle (per-payload overhead)
//! - End-to-end throughput into a discarding sink, coalesce vs vectored
//! - Contended throughput with several producers sharing one writer

use std::sync::Arc;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use tell_writer::{BatchWriter, BufferPool, WriteMode, WriterConfig};
use tokio::runtime::Runtime;

/// Payloads written per iteration
const PAYLOADS: usize = 10_000;

/// Payload sizes: a short log line, a typical event, a large event
const PAYLOAD_SIZES: &[usize] = &[64, 200, 1000];

fn config(mode: WriteMode) -> WriterConfig {
    let config = WriterConfig::default()
        .with_name("bench")
        .with_max_in_flight(1024)
        .with_write_mode(mode)
        .block_on_full();
    match mode {
        WriteMode::Coalesce => config.with_max_flush_delay(Duration::from_millis(1)),
        _ => config,
    }
}

// =============================================================================
// Buffer Pool Benchmarks
// =============================================================================

fn bench_buffer_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("writer_buffer_pool");
    let pool = BufferPool::new(64, 512);
    let payload = vec![0x42u8; 200];

    group.bench_function("acquire_copy_release", |b| {
        b.iter(|| {
            let buf = pool.acquire_copy(black_box(&payload));
            pool.release(buf);
        });
    });

    group.finish();
}

// =============================================================================
// Throughput Benchmarks
// =============================================================================

fn bench_single_producer(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("writer_single_producer");

    for &size in PAYLOAD_SIZES {
        let payload = vec![0x42u8; size];
        group.throughput(Throughput::Bytes((PAYLOADS * size) as u64));

        for mode in [WriteMode::Coalesce, WriteMode::Vectored] {
            group.bench_with_input(BenchmarkId::new(mode.as_str(), size), &payload, |b, payload| {
                b.to_async(&rt).iter(move || async move {
                    let writer = BatchWriter::spawn(tokio::io::sink(), config(mode)).unwrap();
                    for _ in 0..PAYLOADS {
                        writer.write(payload).await.unwrap();
                    }
                    writer.close().await.unwrap();
                });
            });
        }
    }

    group.finish();
}

fn bench_contended(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("writer_contended");
    let producers = 4;
    let payload: Arc<[u8]> = vec![0x42u8; 200].into();

    group.throughput(Throughput::Elements((PAYLOADS * producers) as u64));
    for mode in [WriteMode::Coalesce, WriteMode::Vectored] {
        group.bench_function(mode.as_str(), |b| {
            b.to_async(&rt).iter(|| {
                let payload = Arc::clone(&payload);
                async move {
                    let writer = BatchWriter::spawn(tokio::io::sink(), config(mode)).unwrap();
                    let mut tasks = Vec::with_capacity(producers);
                    for _ in 0..producers {
                        let writer = writer.clone();
                        let payload = Arc::clone(&payload);
                        tasks.push(tokio::spawn(async move {
                            for _ in 0..PAYLOADS {
                                writer.write(&payload).await.unwrap();
                            }
                        }));
                    }
                    for task in tasks {
                        task.await.unwrap();
                    }
                    writer.close().await.unwrap();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_buffer_pool,
    bench_single_producer,
    bench_contended
);
criterion_main!(benches);
