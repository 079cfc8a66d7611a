//! Criterion micro-benchmarks for single integrator steps.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cadence_core::JobError;
use cadence_integ::{AdaptiveConfig, Integrator, IntegratorKind, Segment, StepMode};

const DIM: usize = 128;

fn integrator(kind: IntegratorKind) -> Integrator {
    let seg = Segment {
        offset: 0,
        len: DIM,
        second_order: false,
    };
    Integrator::new(kind, vec![seg], AdaptiveConfig::default()).unwrap()
}

fn oscillator(_t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), JobError> {
    for (pair, d) in y.chunks_exact(2).zip(dydt.chunks_exact_mut(2)) {
        d[0] = pair[1];
        d[1] = -pair[0];
    }
    Ok(())
}

/// Benchmark: one committed step of a 128-value system per strategy.
fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("integrator_step_128");
    for kind in IntegratorKind::ALL {
        group.bench_with_input(BenchmarkId::from_parameter(kind), &kind, |b, &kind| {
            let mut integ = integrator(kind);
            let mut y = vec![1.0; DIM];
            let mut t = 0.0;
            let mut src = oscillator;
            b.iter(|| {
                integ
                    .advance(&mut src, t, &mut y, 1e-3, StepMode::Commit)
                    .unwrap();
                t += 1e-3;
                black_box(&y);
            });
        });
    }
    group.finish();
}

/// Benchmark: a trial step, as used when locating event crossings.
fn bench_trial_step(c: &mut Criterion) {
    c.bench_function("rk4_trial_step_128", |b| {
        let mut integ = integrator(IntegratorKind::Rk4);
        let y0 = vec![1.0; DIM];
        let mut y = y0.clone();
        let mut src = oscillator;
        b.iter(|| {
            y.copy_from_slice(&y0);
            integ
                .advance(&mut src, 0.0, &mut y, 5e-4, StepMode::Trial)
                .unwrap();
            black_box(&y);
        });
    });
}

criterion_group!(benches, bench_step, bench_trial_step);
criterion_main!(benches);
