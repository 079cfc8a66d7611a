//! Criterion benchmarks for whole executive frames.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cadence_bench::{bouncing_profile, cascade_profile, decay_profile};
use cadence_engine::{Executive, SimConfig};
use cadence_integ::IntegratorKind;

fn ready(config: SimConfig) -> Executive {
    let mut exec = Executive::new(config).unwrap();
    exec.initialize().unwrap();
    exec
}

/// Benchmark: one frame of a 256-wide decay vector per integrator.
fn bench_decay_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("decay_frame");
    for kind in [
        IntegratorKind::Euler,
        IntegratorKind::Rk4,
        IntegratorKind::Abm4,
        IntegratorKind::Rkf45,
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(kind), &kind, |b, &kind| {
            let mut exec = ready(decay_profile(256, kind, false));
            b.iter(|| {
                exec.step_frame().unwrap();
                black_box(exec.state("x"));
            });
        });
    }
    group.finish();
}

/// Benchmark: serial vs rayon derivative evaluation over 64 vectors.
fn bench_parallel_derivatives(c: &mut Criterion) {
    let mut group = c.benchmark_group("derivatives_64_vectors");
    for parallel in [false, true] {
        let label = if parallel { "parallel" } else { "serial" };
        group.bench_function(label, |b| {
            let mut exec = ready(decay_profile(64, IntegratorKind::Rk4, parallel));
            b.iter(|| exec.step_frame().unwrap());
        });
    }
    group.finish();
}

/// Benchmark: 32 bouncing balls, events located inside steps.
fn bench_bouncing_frame(c: &mut Criterion) {
    c.bench_function("bouncing_32_balls_frame", |b| {
        let mut exec = ready(bouncing_profile(32));
        b.iter(|| exec.step_frame().unwrap());
    });
}

/// Benchmark: one frame of the three-level multi-rate cascade.
fn bench_cascade_frame(c: &mut Criterion) {
    c.bench_function("cascade_frame", |b| {
        let mut exec = ready(cascade_profile());
        b.iter(|| exec.step_frame().unwrap());
    });
}

criterion_group!(
    benches,
    bench_decay_frame,
    bench_parallel_derivatives,
    bench_bouncing_frame,
    bench_cascade_frame
);
criterion_main!(benches);
