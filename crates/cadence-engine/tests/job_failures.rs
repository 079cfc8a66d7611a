//! Integration test: return policies.
//!
//! A degraded job is recorded and skipped while the run continues; a
//! fatal job, derivative or event handler stops the frame loop, names
//! itself in the error and leaves the shutdown jobs to run.

use cadence_core::{ControlCommand, ExecError, JobError, StateDef};
use cadence_engine::{EventDef, ExecLimits, ExecMode, Executive, LoopDef, MemorySink, SimConfig};
use cadence_event::Direction;
use cadence_integ::{AdaptiveConfig, IntegratorKind};
use cadence_job::{condition_fn, derivative_fn, job_fn, JobClass, JobSpec, ReturnPolicy};
use cadence_test_utils::{
    Altitude, DecayDerivative, FailingJob, FreeFall, RecordingJob, SharedLog,
};

fn decay() -> SimConfig {
    SimConfig::new(0.1)
        .state(StateDef::first_order("x", vec![1.0]))
        .integration_loop(LoopDef::new("main", 0.05, IntegratorKind::Rk4).state("x"))
        .derivative("decay", "x", DecayDerivative { rate: 1.0 })
}

#[test]
fn degraded_job_is_skipped_until_reenabled() {
    let sink = MemorySink::new();
    let config = decay().job(
        JobSpec::new("flaky", JobClass::Scheduled),
        FailingJob::new("flaky", 2, 7),
    );
    let mut exec = Executive::new(config).unwrap();
    exec.set_telemetry(sink.clone());
    for _ in 0..6 {
        assert_eq!(exec.step_frame(), Ok(ExecMode::Running));
    }
    let flaky = exec.job_id("flaky").unwrap();
    let entry = exec.job(flaky).unwrap();
    assert!(entry.is_degraded());
    assert_eq!(entry.run_count(), 2);
    assert_eq!(entry.error_count(), 1);

    let errors: Vec<_> = sink.frames().into_iter().flat_map(|f| f.job_errors).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].name, "flaky");
    assert_eq!(errors[0].code, 7);
    assert_eq!(errors[0].job, Some(flaky));
    assert!(!errors[0].fatal);

    // Re-enabling clears the mark; the job fails again on its next call.
    exec.post(ControlCommand::EnableJob { job: flaky }).unwrap();
    exec.step_frame().unwrap();
    assert_eq!(exec.job(flaky).unwrap().error_count(), 2);
    assert!(exec.job(flaky).unwrap().is_degraded());
    assert_eq!(exec.mode(), ExecMode::Running);
}

#[test]
fn fatal_job_stops_the_run_and_shutdown_still_runs() {
    let log = SharedLog::new();
    let config = decay()
        .job(
            JobSpec::new("critical", JobClass::Scheduled).policy(ReturnPolicy::Fatal),
            FailingJob::new("critical", 1, 3),
        )
        .job(
            JobSpec::new("after", JobClass::Scheduled).phase(1),
            RecordingJob::new("after", &log),
        )
        .job(JobSpec::new("bye", JobClass::Shutdown), RecordingJob::new("bye", &log));
    let mut exec = Executive::new(config).unwrap();

    exec.step_frame().unwrap();
    let err = exec.step_frame().unwrap_err();
    match &err {
        ExecError::JobFailed { job, frame, error } => {
            assert_eq!(job, "critical");
            assert_eq!(*frame, 1);
            assert_eq!(error.code, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(exec.mode(), ExecMode::ShuttingDown);
    assert_eq!(exec.failure(), Some(&err));
    // The frame stopped at the failing job.
    assert_eq!(log.lines(), vec!["after@0"]);
    assert!(exec.last_frame().job_errors.iter().any(|e| e.fatal));

    assert_eq!(exec.step_frame(), Ok(ExecMode::Terminated));
    assert_eq!(log.lines(), vec!["after@0", "bye@1"]);
    assert_eq!(exec.step_frame(), Err(ExecError::Terminated));
}

#[test]
fn run_returns_the_first_fatal_error() {
    let config = decay()
        .job(
            JobSpec::new("critical", JobClass::EndOfFrame).policy(ReturnPolicy::Fatal),
            FailingJob::new("critical", 4, 9),
        )
        .stop_at(10.0);
    let mut exec = Executive::new(config).unwrap();
    let err = exec.run().unwrap_err();
    assert!(matches!(err, ExecError::JobFailed { frame: 4, .. }));
    assert_eq!(exec.mode(), ExecMode::Terminated);
    assert_eq!(exec.frame().0, 4);
}

#[test]
fn derivative_failure_is_fatal_and_named() {
    let config = SimConfig::new(0.1)
        .state(StateDef::first_order("x", vec![1.0]))
        .integration_loop(LoopDef::new("main", 0.05, IntegratorKind::Rk4).state("x"))
        .derivative(
            "fragile",
            "x",
            derivative_fn(|v, d| {
                if v.time() > 0.25 {
                    return Err(JobError::new(11, "out of table range"));
                }
                d[0] = -v.own()[0];
                Ok(())
            }),
        );
    let mut exec = Executive::new(config).unwrap();
    exec.step_frame().unwrap();
    exec.step_frame().unwrap();
    let err = exec.step_frame().unwrap_err();
    assert!(
        matches!(&err, ExecError::JobFailed { job, frame: 2, error } if job == "fragile" && error.code == 11),
        "{err}"
    );
    let record = &exec.last_frame().job_errors[0];
    assert_eq!(record.class, JobClass::Derivative);
    assert!(record.fatal);
}

#[test]
fn initialization_failure_prevents_running() {
    let config = decay().job(
        JobSpec::new("load-tables", JobClass::Initialization),
        FailingJob::new("load-tables", 0, 5),
    );
    let mut exec = Executive::new(config).unwrap();
    assert!(matches!(
        exec.initialize(),
        Err(ExecError::JobFailed { ref job, .. }) if job == "load-tables"
    ));
    assert_eq!(exec.mode(), ExecMode::ShuttingDown);
    assert_eq!(exec.step_frame(), Ok(ExecMode::Terminated));
}

// ── Event handlers ─────────────────────────────────────────────────

fn falling_ball(handler_policy: ReturnPolicy) -> SimConfig {
    SimConfig::new(0.1)
        .state(StateDef::second_order("ball", &[0.5], &[0.0]))
        .integration_loop(LoopDef::new("flight", 0.01, IntegratorKind::Rk4).state("ball"))
        .derivative("gravity", "ball", FreeFall { gravity: 9.81 })
        .event(
            EventDef::new("ground", "ball", Altitude)
                .direction(Direction::Falling)
                .handler(FailingJob::new("on-ground", 0, 21))
                .policy(handler_policy),
        )
}

#[test]
fn failing_degraded_handler_disarms_its_event() {
    let sink = MemorySink::new();
    let mut exec = Executive::new(falling_ball(ReturnPolicy::Degraded).stop_at(1.0)).unwrap();
    exec.set_telemetry(sink.clone());
    exec.run().unwrap();

    let ground = exec.event(exec.event_id("ground").unwrap()).unwrap();
    assert!(ground.degraded);
    assert_eq!(ground.fire_count, 1);
    let errors: Vec<_> = sink.frames().into_iter().flat_map(|f| f.job_errors).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].name, "ground");
    assert_eq!(errors[0].class, JobClass::DynamicEvent);
    assert_eq!(errors[0].job, None);
    assert_eq!(errors[0].code, 21);
}

#[test]
fn failing_fatal_handler_stops_the_run() {
    let mut exec = Executive::new(falling_ball(ReturnPolicy::Fatal).stop_at(1.0)).unwrap();
    let err = exec.run().unwrap_err();
    assert!(matches!(err, ExecError::JobFailed { ref job, .. } if job == "ground"));
    // Impact at about 0.32 s, in frame 3.
    assert!(matches!(err, ExecError::JobFailed { frame: 3, .. }));
}

#[test]
fn handler_that_keeps_recrossing_is_an_event_storm() {
    let limits = ExecLimits {
        max_event_firings_per_step: 8,
        ..ExecLimits::default()
    };
    // x falls at unit rate; every firing lifts it just above zero again.
    let config = SimConfig::new(1.0)
        .state(StateDef::first_order("x", vec![0.5]))
        .integration_loop(LoopDef::new("main", 1.0, IntegratorKind::Euler).state("x"))
        .derivative(
            "sink",
            "x",
            derivative_fn(|_, d| {
                d[0] = -1.0;
                Ok(())
            }),
        )
        .event(
            EventDef::new("zero", "x", condition_fn(|v| v.own()[0]))
                .direction(Direction::Falling)
                .handler(job_fn("lift", |ctx| {
                    let id = ctx.find_state("x").ok_or_else(|| JobError::new(1, "no x"))?;
                    if let Some(x) = ctx.state_mut(id) {
                        x[0] = 1e-3;
                    }
                    Ok(())
                })),
        )
        .limits(limits);
    let mut exec = Executive::new(config).unwrap();
    let err = exec.step_frame().unwrap_err();
    assert!(
        matches!(&err, ExecError::EventStorm { event, frame: 0, .. } if event == "zero"),
        "{err}"
    );
    assert_eq!(exec.mode(), ExecMode::ShuttingDown);
}

// ── Integration and detection limits ───────────────────────────────

#[test]
fn unconverged_crossing_is_reported_as_a_warning() {
    let sink = MemorySink::new();
    let config = SimConfig::new(0.1)
        .state(StateDef::second_order("ball", &[0.5], &[0.0]))
        .integration_loop(LoopDef::new("flight", 0.01, IntegratorKind::Rk4).state("ball"))
        .derivative("gravity", "ball", FreeFall { gravity: 9.81 })
        .event(
            EventDef::new("ground", "ball", Altitude)
                .direction(Direction::Falling)
                .tolerance(1e-15)
                .max_iterations(1),
        )
        .stop_at(0.5);
    let mut exec = Executive::new(config).unwrap();
    exec.set_telemetry(sink.clone());
    exec.run().unwrap();

    let warnings: Vec<_> = sink.frames().into_iter().flat_map(|f| f.warnings).collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].event, "ground");
    // The best estimate is still used: the event fired once, near 0.32 s.
    assert!((warnings[0].time - (2.0 * 0.5 / 9.81f64).sqrt()).abs() < 0.01);
    let ground = exec.event(exec.event_id("ground").unwrap()).unwrap();
    assert_eq!(ground.fire_count, 1);
    assert_eq!(exec.mode(), ExecMode::Terminated);
}

#[test]
fn exhausted_adaptive_retries_stop_the_run() {
    let unreachable = AdaptiveConfig {
        atol: 1e-300,
        rtol: 0.0,
        max_reductions: 2,
        ..AdaptiveConfig::default()
    };
    let config = SimConfig::new(0.1)
        .state(StateDef::first_order("x", vec![1.0]))
        .integration_loop(
            LoopDef::new("stiff", 0.1, IntegratorKind::Rkf45)
                .state("x")
                .adaptive(unreachable),
        )
        .derivative("decay", "x", DecayDerivative { rate: 50.0 });
    let mut exec = Executive::new(config).unwrap();
    let err = exec.step_frame().unwrap_err();
    assert!(
        matches!(err, ExecError::IntegrationRetryExhausted { .. }),
        "{err}"
    );
    assert_eq!(exec.mode(), ExecMode::ShuttingDown);
    assert_eq!(exec.step_frame(), Ok(ExecMode::Terminated));
}
