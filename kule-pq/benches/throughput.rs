//! Throughput benchmarks for the skip-list priority queue

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kule_pq::PriorityQueue;
use std::sync::Arc;
use std::thread;

fn bench_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("push");

    for batch in [100u64, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*batch));
        group.bench_with_input(BenchmarkId::from_parameter(batch), batch, |b, &size| {
            b.iter(|| {
                let pq = PriorityQueue::new();
                for i in 0..size {
                    pq.push(black_box(i * 2_654_435_761 % size));
                }
            });
        });
    }

    group.finish();
}

fn bench_push_pop_pairs(c: &mut Criterion) {
    let mut group = c.benchmark_group("push_pop_pairs");
    let pq = PriorityQueue::new();

    group.bench_function("single_thread", |b| {
        let mut i = 0u64;
        b.iter(|| {
            pq.push(black_box(i));
            black_box(pq.pop());
            i = i.wrapping_add(1);
        });
    });

    group.finish();
    while pq.pop().is_some() {}
}

fn bench_concurrent_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_drain");
    group.sample_size(10);

    for threads in [2usize, 4, 8].iter() {
        group.bench_with_input(
            BenchmarkId::new("producers_consumers", threads),
            threads,
            |b, &pairs| {
                b.iter(|| {
                    const PER_THREAD: u64 = 2_000;
                    let pq = Arc::new(PriorityQueue::new());
                    let mut handles = Vec::new();

                    for tid in 0..pairs as u64 {
                        let pq = pq.clone();
                        handles.push(thread::spawn(move || {
                            for i in 0..PER_THREAD {
                                pq.push(tid * PER_THREAD + i);
                            }
                        }));
                    }
                    for _ in 0..pairs {
                        let pq = pq.clone();
                        handles.push(thread::spawn(move || {
                            let mut popped = 0;
                            while popped < PER_THREAD {
                                if pq.pop().is_some() {
                                    popped += 1;
                                } else {
                                    thread::yield_now();
                                }
                            }
                        }));
                    }

                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_push,
    bench_push_pop_pairs,
    bench_concurrent_drain
);
criterion_main!(benches);
