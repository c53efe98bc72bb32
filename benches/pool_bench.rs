//! Performance benchmarks for pool operations

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use slotnet_server::pool::{AdmissionGate, BufferArena, SlotPool};
use slotnet_server::session::Outbound;

fn slot_pool_benchmark(c: &mut Criterion) {
    let pool = SlotPool::filled(10_000, |i| i);

    let mut group = c.benchmark_group("slot_pool");

    group.bench_function("acquire_release_cycle", |b| {
        b.iter(|| {
            let slot = pool.try_acquire().unwrap();
            black_box(&slot);
            pool.release(slot);
        })
    });

    group.bench_function("stats", |b| {
        b.iter(|| {
            black_box(pool.stats());
        })
    });

    group.finish();
}

fn admission_gate_benchmark(c: &mut Criterion) {
    let gate = AdmissionGate::new(10_000);

    let mut group = c.benchmark_group("admission_gate");

    group.bench_function("try_wait_release", |b| {
        b.iter(|| {
            let permit = gate.try_wait().unwrap();
            black_box(&permit);
            permit.release();
        })
    });

    group.finish();
}

fn chunking_benchmark(c: &mut Criterion) {
    let (_, mut send) = BufferArena::new(1, 8192).into_segments();
    let mut segment = send.pop().unwrap();
    let payload = Bytes::from(vec![0xA5u8; 64 * 1024]);

    let mut group = c.benchmark_group("chunking");
    group.throughput(Throughput::Bytes(payload.len() as u64));

    group.bench_function("stage_64k", |b| {
        b.iter(|| {
            let mut outbound = Outbound::default();
            outbound.begin(payload.clone());
            while outbound.remaining() > 0 {
                let len = outbound.stage(&mut segment);
                outbound.advance(black_box(len));
            }
        })
    });

    group.finish();
}

fn metrics_benchmark(c: &mut Criterion) {
    use slotnet_server::metrics::METRICS;

    let mut group = c.benchmark_group("metrics");
    group.throughput(Throughput::Elements(1));

    group.bench_function("counter_increment", |b| {
        b.iter(|| {
            METRICS.bytes_rx(black_box(1024));
        })
    });

    group.bench_function("snapshot", |b| {
        b.iter(|| {
            let snapshot = METRICS.snapshot();
            black_box(snapshot);
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    slot_pool_benchmark,
    admission_gate_benchmark,
    chunking_benchmark,
    metrics_benchmark,
);
criterion_main!(benches);
