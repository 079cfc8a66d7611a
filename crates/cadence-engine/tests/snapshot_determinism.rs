//! Integration test: capture/restore determinism.
//!
//! A run captured at frame N and restored into a fresh executive built
//! from the same configuration must produce frames identical to the
//! uninterrupted run: same state, same job schedules, same integrator
//! history, same event bookkeeping.

use cadence_core::{Cycle, StateDef};
use cadence_engine::{EventDef, ExecMode, Executive, LoopDef, RestoreError, SimConfig};
use cadence_event::Direction;
use cadence_integ::IntegratorKind;
use cadence_job::{JobClass, JobSpec};
use cadence_snapshot::{compare_images, state_hash};
use cadence_test_utils::{
    Altitude, BounceJob, CountingJob, DecayDerivative, FreeFall, RecordingJob, SharedLog,
};

fn config() -> SimConfig {
    SimConfig::new(0.05)
        .state(StateDef::second_order("ball", &[5.0], &[0.0]))
        .state(StateDef::first_order("charge", vec![1.0, 0.5]))
        .integration_loop(LoopDef::new("flight", 0.01, IntegratorKind::Rk4).state("ball"))
        .integration_loop(
            LoopDef::new("circuit", 0.005, IntegratorKind::Abm4)
                .state("charge")
                .child_of("flight"),
        )
        .derivative("gravity", "ball", FreeFall { gravity: 9.81 })
        .derivative("discharge", "charge", DecayDerivative { rate: 0.7 })
        .event(
            EventDef::new("touchdown", "ball", Altitude)
                .direction(Direction::Falling)
                .handler(BounceJob::new("ball", 0.9)),
        )
        .job(
            JobSpec::new("every-third", JobClass::Scheduled).cycle(Cycle::frames(3)),
            CountingJob::new("every-third"),
        )
        .job(JobSpec::new("logger", JobClass::Log), CountingJob::new("logger"))
}

fn step(exec: &mut Executive, frames: usize) {
    for _ in 0..frames {
        exec.step_frame().unwrap();
    }
}

#[test]
fn restored_run_matches_uninterrupted_run() {
    let mut straight = Executive::new(config()).unwrap();
    step(&mut straight, 60);
    let blob = straight.capture_state().unwrap();

    let mut resumed = Executive::new(config()).unwrap();
    resumed.restore_state(blob.as_bytes()).unwrap();
    assert_eq!(resumed.mode(), ExecMode::Running);
    assert_eq!(resumed.frame(), straight.frame());

    // The ball bounces during this stretch, so event state is exercised.
    step(&mut straight, 40);
    step(&mut resumed, 40);

    let a = straight.capture_image().unwrap();
    let b = resumed.capture_image().unwrap();
    assert_eq!(compare_images(&a, &b), None);
    assert_eq!(state_hash(&a), state_hash(&b));
    assert_eq!(straight.state("ball"), resumed.state("ball"));
    assert_eq!(straight.state("charge"), resumed.state("charge"));

    let touchdown = straight.event_id("touchdown").unwrap();
    assert!(straight.event(touchdown).unwrap().fire_count >= 1);
}

#[test]
fn adaptive_loops_resume_with_their_step_size() {
    let bouncing = |kind| {
        SimConfig::new(0.05)
            .state(StateDef::second_order("ball", &[2.0], &[0.0]))
            .integration_loop(LoopDef::new("flight", 0.05, kind).state("ball"))
            .derivative("gravity", "ball", FreeFall { gravity: 9.81 })
            .event(
                EventDef::new("touchdown", "ball", Altitude)
                    .direction(Direction::Falling)
                    .handler(BounceJob::new("ball", 0.7)),
            )
    };
    for kind in [IntegratorKind::Rkf45, IntegratorKind::Rkf78] {
        for split in [0, 1, 7, 13] {
            let mut straight = Executive::new(bouncing(kind)).unwrap();
            step(&mut straight, split);
            let blob = straight.capture_state().unwrap();
            let mut resumed = Executive::new(bouncing(kind)).unwrap();
            resumed.restore_state(blob.as_bytes()).unwrap();

            // First impact is near 0.64 s, frame 12.
            step(&mut straight, 20);
            step(&mut resumed, 20);
            let a = straight.capture_image().unwrap();
            let b = resumed.capture_image().unwrap();
            assert_eq!(compare_images(&a, &b), None, "{kind} split at {split}");
            assert!(a.loops[0].h_next.is_some(), "{kind} keeps an adaptive step");
        }
    }
}

#[test]
fn capture_then_restore_is_idempotent() {
    let mut exec = Executive::new(config()).unwrap();
    step(&mut exec, 17);
    let first = exec.capture_state().unwrap();
    exec.restore_state(first.as_bytes()).unwrap();
    let second = exec.capture_state().unwrap();
    assert_eq!(first, second);
}

#[test]
fn frozen_mode_survives_restore() {
    let mut exec = Executive::new(config().frozen_start()).unwrap();
    exec.initialize().unwrap();
    assert_eq!(exec.mode(), ExecMode::Frozen);
    let blob = exec.capture_state().unwrap();

    let mut fresh = Executive::new(config()).unwrap();
    fresh.restore_state(blob.as_bytes()).unwrap();
    assert_eq!(fresh.mode(), ExecMode::Frozen);
    fresh.step_frame().unwrap();
    assert_eq!(fresh.frame().0, 0);
}

#[test]
fn restart_jobs_run_and_initialization_does_not() {
    let mut source = Executive::new(config()).unwrap();
    step(&mut source, 5);
    let blob = source.capture_state().unwrap();

    let log = SharedLog::new();
    let with_hooks = config()
        .job(
            JobSpec::new("init", JobClass::Initialization),
            RecordingJob::new("init", &log),
        )
        .job(
            JobSpec::new("restart", JobClass::Restart),
            RecordingJob::new("restart", &log),
        );
    let mut exec = Executive::new(with_hooks).unwrap();
    // Two extra jobs: the registry no longer matches the image.
    let err = exec.restore_state(blob.as_bytes()).unwrap_err();
    assert!(matches!(err, RestoreError::Mismatch { .. }), "{err}");
    assert!(log.lines().is_empty());

    let mut twin = Executive::new(
        config()
            .job(
                JobSpec::new("init", JobClass::Initialization),
                RecordingJob::new("init", &log),
            )
            .job(
                JobSpec::new("restart", JobClass::Restart),
                RecordingJob::new("restart", &log),
            ),
    )
    .unwrap();
    step(&mut twin, 5);
    let blob = twin.capture_state().unwrap();
    log.clear();
    exec.restore_state(blob.as_bytes()).unwrap();
    assert_eq!(log.lines(), vec!["restart@5"]);
}

#[test]
fn restore_is_refused_after_shutdown() {
    let mut exec = Executive::new(config().stop_at(0.1)).unwrap();
    step(&mut exec, 1);
    let blob = exec.capture_state().unwrap();
    exec.run().unwrap();
    let err = exec.restore_state(blob.as_bytes()).unwrap_err();
    assert!(matches!(
        err,
        RestoreError::InvalidMode {
            mode: ExecMode::Terminated
        }
    ));
}
