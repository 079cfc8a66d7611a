//! Accuracy properties of the integrator strategies.

use cadence_core::JobError;
use cadence_integ::{AdaptiveConfig, Integrator, IntegratorKind, Segment, StepMode};
use proptest::prelude::*;

fn oscillator(_t: f64, y: &[f64], out: &mut [f64]) -> Result<(), JobError> {
    out[0] = y[1];
    out[1] = -y[0];
    Ok(())
}

fn integrator(kind: IntegratorKind) -> Integrator {
    let seg = Segment {
        offset: 0,
        len: 2,
        second_order: true,
    };
    Integrator::new(kind, vec![seg], AdaptiveConfig::default()).unwrap()
}

fn run(kind: IntegratorKind, y0: [f64; 2], h: f64, steps: usize) -> [f64; 2] {
    let mut integ = integrator(kind);
    let mut y = y0;
    let mut src = oscillator;
    for i in 0..steps {
        integ
            .advance(&mut src, i as f64 * h, &mut y, h, StepMode::Commit)
            .unwrap();
    }
    y
}

#[test]
fn euler_cromer_keeps_oscillator_energy_bounded() {
    let mut integ = integrator(IntegratorKind::EulerCromer);
    let mut src = oscillator;
    let mut y = [1.0, 0.0];
    let h = 0.05;
    let mut worst: f64 = 0.0;
    for i in 0..20_000 {
        integ
            .advance(&mut src, i as f64 * h, &mut y, h, StepMode::Commit)
            .unwrap();
        let energy = 0.5 * (y[0] * y[0] + y[1] * y[1]);
        worst = worst.max((energy - 0.5).abs());
    }
    // Explicit Euler would grow the energy by a factor (1+h^2)^n.
    assert!(worst < 0.05, "energy drift {worst}");
}

#[test]
fn adaptive_rkf78_tracks_long_oscillation() {
    let y = run(IntegratorKind::Rkf78, [1.0, 0.0], 1.0, 10);
    assert!((y[0] - 10f64.cos()).abs() < 1e-7);
    assert!((y[1] + 10f64.sin()).abs() < 1e-7);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// R sub-steps of D/R agree with one direct step of D to within the
    /// local truncation error of a fourth-order method.
    #[test]
    fn substeps_match_direct_step(ratio in 1usize..=8, d in 0.01f64..0.2, x0 in -2.0f64..2.0) {
        let y0 = [x0, 0.5];
        let direct = run(IntegratorKind::Rk4, y0, d, 1);
        let nested = run(IntegratorKind::Rk4, y0, d / ratio as f64, ratio);
        let norm = (x0 * x0 + 0.25).sqrt();
        let bound = norm * d.powi(5) / 60.0 + 1e-14;
        prop_assert!((direct[0] - nested[0]).abs() <= bound);
        prop_assert!((direct[1] - nested[1]).abs() <= bound);
    }
}
