use std::cell::Cell;
use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lattice_reactivity::{batch, effect, Computed, Signal};

/// One signal feeding `width` computeds that a single effect reads.
fn bench_fan_in(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_in");

    for &width in &[10_usize, 100, 1_000] {
        let source = Signal::new(0_u64);
        let computeds: Vec<Computed<u64>> = (0..width as u64)
            .map(|i| {
                let s = source.clone();
                Computed::new(move |_| s.get() + i)
            })
            .collect();

        let sum = Rc::new(Cell::new(0));
        let (cs, out) = (computeds.clone(), sum.clone());
        let _e = effect(move || out.set(cs.iter().map(Computed::get).sum::<u64>()));

        group.bench_function(format!("write(width={width})"), |b| {
            b.iter(|| {
                source.update(|v| v + 1);
                black_box(sum.get());
            })
        });
    }

    group.finish();
}

/// A chain of `depth` computeds read by one effect.
fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain");

    for &depth in &[10_usize, 100, 1_000] {
        let source = Signal::new(0_u64);
        let s = source.clone();
        let mut last = Computed::new(move |_| s.get());
        last.get();
        for _ in 0..depth {
            let prev = last.clone();
            last = Computed::new(move |_| prev.get() + 1);
            last.get();
        }

        let tip = last.clone();
        let _e = effect(move || {
            black_box(tip.get());
        });

        group.bench_function(format!("write(depth={depth})"), |b| {
            b.iter(|| source.update(|v| v + 1))
        });
    }

    group.finish();
}

/// Branch switching: an effect alternates between two halves of its
/// dependencies, exercising edge reuse and unlinking.
fn bench_branch_switch(c: &mut Criterion) {
    let toggle = Signal::new(false);
    let left: Vec<Signal<u32>> = (0..50).map(Signal::new).collect();
    let right: Vec<Signal<u32>> = (0..50).map(Signal::new).collect();

    let (t, l, r) = (toggle.clone(), left.clone(), right.clone());
    let _e = effect(move || {
        let side = if t.get() { &l } else { &r };
        black_box(side.iter().map(Signal::get).sum::<u32>());
    });

    c.bench_function("branch_switch", |b| b.iter(|| toggle.update(|v| !v)));
}

/// Many writes collapsed into one flush.
fn bench_batch(c: &mut Criterion) {
    let signals: Vec<Signal<u64>> = (0..100).map(Signal::new).collect();
    let runs = Rc::new(Cell::new(0_u64));

    let (ss, out) = (signals.clone(), runs.clone());
    let _e = effect(move || {
        black_box(ss.iter().map(Signal::get).sum::<u64>());
        out.set(out.get() + 1);
    });

    c.bench_function("batch_100_writes", |b| {
        b.iter(|| {
            batch(|| {
                for s in &signals {
                    s.update(|v| v + 1);
                }
            })
        })
    });
}

criterion_group!(benches, bench_fan_in, bench_chain, bench_branch_switch, bench_batch);
criterion_main!(benches);
