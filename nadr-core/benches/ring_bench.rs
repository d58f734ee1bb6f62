//! Ring and Handoff Performance Benchmark
//!
//! Measures byte ring push/pop and transport pulls through the handoff in
//! zero-copy and always-copy modes.
//!
//! **Goal:** A zero-copy pull costs the same regardless of payload size
//! **Target:** A 1476-byte pull stays under one microsecond

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nadr_core::playback::{ByteRing, HandoffConsumer};

const RING_BYTES: usize = 1 << 20;
const PULL_BYTES: usize = 1476;

fn bench_ring_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_operations");

    group.bench_function("push_pop_8k", |b| {
        let (mut tx, mut rx, _) = ByteRing::new(RING_BYTES).unwrap().split();
        let data = vec![0x5Au8; 8192];
        let mut out = vec![0u8; 8192];

        b.iter(|| {
            let pushed = tx.push(black_box(&data));
            let popped = rx.pop(black_box(&mut out));
            black_box((pushed, popped));
        });
    });

    group.bench_function("direct_write_8k", |b| {
        let (mut tx, mut rx, _) = ByteRing::new(RING_BYTES).unwrap().split();
        let mut out = vec![0u8; 8192];

        b.iter(|| {
            if let Some(mut session) = tx.session() {
                if let Some(region) = session.direct_write_region(8192) {
                    region.fill(0x5A);
                    session.commit_write(8192);
                } else {
                    session.push(&out[..8192]);
                }
            }
            black_box(rx.pop(&mut out));
        });
    });

    group.finish();
}

fn bench_handoff(c: &mut Criterion) {
    let mut group = c.benchmark_group("handoff");

    for zero_copy in [true, false] {
        let name = if zero_copy { "pull_zero_copy" } else { "pull_copy" };
        group.bench_function(name, |b| {
            let (mut tx, rx, control) = ByteRing::new(RING_BYTES).unwrap().split();
            control.set_zero_copy(zero_copy);
            let mut consumer = HandoffConsumer::new(rx, PULL_BYTES);
            let refill = vec![0x33u8; 64 * 1024];

            b.iter(|| {
                if tx.available() < 2 * PULL_BYTES {
                    tx.push(&refill);
                }
                let pull = consumer.pull(black_box(PULL_BYTES));
                black_box(pull.bytes().len());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_ring_operations, bench_handoff);
criterion_main!(benches);
