//! Property tests over whole executives.

use std::sync::atomic::Ordering;

use cadence_core::{Cycle, StateDef};
use cadence_engine::{Executive, LoopDef, SimConfig};
use cadence_integ::IntegratorKind;
use cadence_job::{JobClass, JobSpec};
use cadence_test_utils::{CountingJob, DecayDerivative};
use proptest::prelude::*;

fn config(kind: IntegratorKind, rate: f64) -> SimConfig {
    SimConfig::new(0.1)
        .state(StateDef::first_order("x", vec![1.0, -2.0]))
        .integration_loop(LoopDef::new("main", 0.025, kind).state("x"))
        .derivative("decay", "x", DecayDerivative { rate })
}

fn kind() -> impl Strategy<Value = IntegratorKind> {
    prop_oneof![
        Just(IntegratorKind::Euler),
        Just(IntegratorKind::Rk2),
        Just(IntegratorKind::Rk4),
        Just(IntegratorKind::Rkg4),
        Just(IntegratorKind::Abm4),
        Just(IntegratorKind::Rkf45),
        Just(IntegratorKind::Rkf78),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn restore_at_any_frame_resumes_identically(
        kind in kind(),
        rate in 0.1f64..5.0,
        split in 0usize..12,
        tail in 1usize..12,
    ) {
        let mut straight = Executive::new(config(kind, rate)).unwrap();
        straight.initialize().unwrap();
        for _ in 0..split {
            straight.step_frame().unwrap();
        }
        let blob = straight.capture_state().unwrap();
        let mut resumed = Executive::new(config(kind, rate)).unwrap();
        resumed.restore_state(blob.as_bytes()).unwrap();

        for _ in 0..tail {
            straight.step_frame().unwrap();
            resumed.step_frame().unwrap();
        }
        prop_assert_eq!(straight.state("x"), resumed.state("x"));
        prop_assert_eq!(straight.derivs("x"), resumed.derivs("x"));
        prop_assert_eq!(straight.frame(), resumed.frame());
    }

    #[test]
    fn cycled_job_runs_once_per_cycle(cycle in 1u32..7, frames in 1u32..40) {
        let job = CountingJob::new("periodic");
        let count = job.counter();
        let config = config(IntegratorKind::Euler, 1.0).job(
            JobSpec::new("periodic", JobClass::Scheduled).cycle(Cycle::frames(cycle)),
            job,
        );
        let mut exec = Executive::new(config).unwrap();
        for _ in 0..frames {
            exec.step_frame().unwrap();
        }
        let expected = u64::from(frames.div_ceil(cycle));
        prop_assert_eq!(count.load(Ordering::Relaxed), expected);
    }
}
