//! Criterion benchmarks for state capture and restore.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use cadence_bench::{bouncing_profile, cascade_profile};
use cadence_engine::Executive;
use cadence_snapshot::{decode_image, encode_image, state_hash};

fn warmed(config: cadence_engine::SimConfig, frames: usize) -> Executive {
    let mut exec = Executive::new(config).unwrap();
    for _ in 0..frames {
        exec.step_frame().unwrap();
    }
    exec
}

/// Benchmark: capture a 64-ball run into a checksummed blob.
fn bench_capture(c: &mut Criterion) {
    let mut exec = warmed(bouncing_profile(64), 20);
    c.bench_function("capture_64_balls", |b| {
        b.iter(|| black_box(exec.capture_state().unwrap()));
    });
}

/// Benchmark: restore the same blob repeatedly, restart jobs included.
fn bench_restore(c: &mut Criterion) {
    let mut exec = warmed(bouncing_profile(64), 20);
    let blob = exec.capture_state().unwrap();
    c.bench_function("restore_64_balls", |b| {
        b.iter(|| exec.restore_state(black_box(blob.as_bytes())).unwrap());
    });
}

/// Benchmark: the codec alone, with the cascade's integrator history.
fn bench_codec(c: &mut Criterion) {
    let mut exec = warmed(cascade_profile(), 10);
    let image = exec.capture_image().unwrap();
    let blob = encode_image(&image).unwrap();

    c.bench_function("encode_cascade_image", |b| {
        b.iter(|| black_box(encode_image(black_box(&image)).unwrap()));
    });
    c.bench_function("decode_cascade_image", |b| {
        b.iter(|| black_box(decode_image(black_box(blob.as_bytes())).unwrap()));
    });
    c.bench_function("state_hash_cascade", |b| {
        b.iter(|| black_box(state_hash(black_box(&image))));
    });
}

criterion_group!(benches, bench_capture, bench_restore, bench_codec);
criterion_main!(benches);
