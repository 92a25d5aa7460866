//! Semaphore benchmarks: uncontended pairs and a two-thread ping-pong.

use std::thread;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use frankensync_core::backend::parking::ParkingSemaphore;
use frankensync_core::{ProcessAbort, Semaphore, SemaphoreBackend};

fn bench_up_down<B: SemaphoreBackend>(c: &mut Criterion, label: &str) {
    let sem = Semaphore::<B, ProcessAbort>::create_with(1, ProcessAbort).unwrap();
    let mut group = c.benchmark_group("semaphore_uncontended");
    group.bench_function(BenchmarkId::new("down_up", label), |b| {
        b.iter(|| {
            sem.down();
            sem.up();
        });
    });
    group.bench_function(BenchmarkId::new("try_down_up", label), |b| {
        b.iter(|| {
            if black_box(sem.try_down()) {
                sem.up();
            }
        });
    });
    group.finish();
    sem.destroy();
}

/// One round trip: the main thread ups `ping`, the partner downs it and ups
/// `pong`, the main thread downs `pong`.
fn bench_ping_pong<B: SemaphoreBackend>(c: &mut Criterion, label: &str) {
    const ROUNDS: u64 = 1_000;

    let mut group = c.benchmark_group("semaphore_ping_pong");
    group.throughput(Throughput::Elements(ROUNDS));
    group.bench_function(label, |b| {
        b.iter(|| {
            let ping = Semaphore::<B, ProcessAbort>::create_with(0, ProcessAbort).unwrap();
            let pong = Semaphore::<B, ProcessAbort>::create_with(0, ProcessAbort).unwrap();
            thread::scope(|s| {
                s.spawn(|| {
                    for _ in 0..ROUNDS {
                        ping.down();
                        pong.up();
                    }
                });
                for _ in 0..ROUNDS {
                    ping.up();
                    pong.down();
                }
            });
            ping.destroy();
            pong.destroy();
        });
    });
    group.finish();
}

fn bench_parking(c: &mut Criterion) {
    bench_up_down::<ParkingSemaphore>(c, "parking_lot");
    bench_ping_pong::<ParkingSemaphore>(c, "parking_lot");
}

#[cfg(unix)]
fn bench_pthread(c: &mut Criterion) {
    use frankensync_core::backend::pthread::{CondvarSemaphore, PthreadSemaphore};
    bench_up_down::<PthreadSemaphore>(c, "pthread");
    bench_ping_pong::<PthreadSemaphore>(c, "pthread");
    bench_ping_pong::<CondvarSemaphore>(c, "pthread_condvar");
}

#[cfg(not(unix))]
fn bench_pthread(_c: &mut Criterion) {}

criterion_group!(benches, bench_parking, bench_pthread);
criterion_main!(benches);
