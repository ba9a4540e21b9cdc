//! Throughput benchmarks for the hazard-pointer queue, in the style of the
//! pack's `hazard-pointers-demo` criterion bench: a short warm-up/measurement
//! window and small sample sizes, since these are lock-free structures whose
//! contention behavior is what we care about, not microsecond-level noise.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use hazardq::{BlockingQueue, HazardRegistry, Queue, QueueConfig};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn custom_criterion() -> Criterion {
    Criterion::default()
        .sample_size(10)
        .measurement_time(Duration::from_secs(1))
        .warm_up_time(Duration::from_secs(1))
}

fn fresh_queue<V: 'static>() -> Queue<V> {
    Queue::with_registry(HazardRegistry::leak(), QueueConfig::default())
}

fn single_threaded(c: &mut Criterion) {
    let mut group = c.benchmark_group("Queue single-threaded");
    group.measurement_time(Duration::from_secs(1));
    group.warm_up_time(Duration::from_secs(1));
    group.sample_size(10);

    group.bench_function("enqueue", |b| {
        b.iter_batched(
            || fresh_queue::<u64>(),
            |q| q.enqueue(42),
            BatchSize::SmallInput,
        );
    });

    group.bench_function("enqueue_then_dequeue", |b| {
        b.iter_batched(
            || fresh_queue::<u64>(),
            |q| {
                q.enqueue(42);
                let _ = q.dequeue_try();
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("Queue contended");
    group.measurement_time(Duration::from_secs(2));
    group.warm_up_time(Duration::from_secs(1));
    group.sample_size(10);

    for producers in [2usize, 4, 8] {
        group.bench_function(format!("{producers}_producers_1_consumer"), |b| {
            b.iter_batched(
                || Arc::new(fresh_queue::<u64>()),
                |q| {
                    let handles: Vec<_> = (0..producers)
                        .map(|_| {
                            let q = Arc::clone(&q);
                            thread::spawn(move || {
                                for i in 0..2_000u64 {
                                    q.enqueue(i);
                                }
                            })
                        })
                        .collect();
                    for h in handles {
                        h.join().unwrap();
                    }
                    let mut drained = 0;
                    while q.dequeue_try().is_some() {
                        drained += 1;
                    }
                    drained
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn blocking(c: &mut Criterion) {
    let mut group = c.benchmark_group("BlockingQueue");
    group.measurement_time(Duration::from_secs(1));
    group.warm_up_time(Duration::from_secs(1));
    group.sample_size(10);

    group.bench_function("enqueue_then_dequeue_wait", |b| {
        b.iter_batched(
            || BlockingQueue::with_registry(HazardRegistry::leak(), QueueConfig::default()),
            |q: BlockingQueue<u64>| {
                q.enqueue(1);
                let _ = q.dequeue_wait();
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = custom_criterion();
    targets = single_threaded, contended, blocking
}
criterion_main!(benches);
