//! Criterion benchmarks for event list insert and drain.

use std::hint::black_box;

use clockwork_bench::{fill_list, note_workload};
use clockwork_core::{RunCounters, TimeSpan};
use clockwork_events::{BucketedEventList, EventList, LinkedEventList};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

const SIZES: [usize; 2] = [1_000, 10_000];

fn make_list(kind: &str) -> Box<dyn EventList> {
    match kind {
        "linked" => Box::new(LinkedEventList::new()),
        "randomizing" => Box::new(LinkedEventList::randomizing(42)),
        _ => Box::new(BucketedEventList::new(
            TimeSpan::new(64).expect("positive width"),
        )),
    }
}

/// Insert a workload spread over ten times its size, then drain it.
fn bench_insert_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_drain");
    for size in SIZES {
        let workload = note_workload(size, size * 10, 7);
        for kind in ["linked", "randomizing", "bucketed"] {
            group.bench_with_input(BenchmarkId::new(kind, size), &workload, |b, w| {
                b.iter(|| {
                    let counters = RunCounters::new();
                    let mut list = make_list(kind);
                    fill_list(list.as_mut(), &counters, w).unwrap();
                    while let Some(note) = list.remove_first() {
                        black_box(note);
                    }
                });
            });
        }
    }
    group.finish();
}

/// Dense ties: every note at one of four instants.
fn bench_same_time_ties(c: &mut Criterion) {
    let mut group = c.benchmark_group("same_time_ties");
    let workload = note_workload(1_000, 3, 11);
    for kind in ["linked", "randomizing", "bucketed"] {
        group.bench_function(kind, |b| {
            b.iter(|| {
                let counters = RunCounters::new();
                let mut list = make_list(kind);
                fill_list(list.as_mut(), &counters, &workload).unwrap();
                black_box(list.len());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_insert_drain, bench_same_time_ties);
criterion_main!(benches);
