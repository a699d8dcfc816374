use std::hint::black_box;
use criterion::{criterion_group, criterion_main, Criterion};
use specev::{canonicalize_set, Event, EventSet, Reconciler};

/// 200 trials, 0–4 events each, candidate in reversed detection order.
fn fixture() -> (EventSet, EventSet) {
    let reference: Vec<Vec<Event>> = (0..200)
        .map(|i| {
            (0..(i * 7 + 3) % 5)
                .map(|k| {
                    let t = 0.05 + 0.2 * k as f64;
                    Event { peak_time: t, peak_freq: 15.0 + (i % 14) as f64, low_freq: 13.0,
                            high_freq: 29.0, onset: t - 0.03, offset: t + 0.04, peak_power: 7.0 }
                })
                .collect()
        })
        .collect();
    let candidate = reference.iter().map(|t| t.iter().rev().copied().collect()).collect();
    (EventSet::from_trials(reference), EventSet::from_trials(candidate))
}

fn bench_reconcile(c: &mut Criterion) {
    let (reference, candidate) = fixture();
    let rec = Reconciler::default();
    c.bench_function("reconcile 200 trials", |b| {
        b.iter(|| {
            let report = rec.reconcile(black_box(&reference), black_box(&candidate)).unwrap();
            black_box(report.passed())
        })
    });
}

fn bench_canonicalize(c: &mut Criterion) {
    let (_, candidate) = fixture();
    c.bench_function("canonicalize_set 200 trials", |b| {
        b.iter(|| black_box(canonicalize_set(black_box(&candidate))).n_trials())
    });
}

criterion_group!(benches, bench_reconcile, bench_canonicalize);
criterion_main!(benches);
