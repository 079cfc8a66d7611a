//! Bouncing ball under the real-time executive.
//!
//! Demonstrates: build config → run paced on a worker thread → freeze,
//! step and resume remotely → capture → restore into a fresh executive.
//!
//! Set `RUST_LOG=cadence_engine=debug` to see the executive's own logs.

use std::time::Duration;

use cadence_core::{ControlCommand, StateDef};
use cadence_engine::{
    ChannelSink, EventDef, ExecMode, Executive, ExecutiveThread, LoopDef, OverrunPolicy,
    RealtimeConfig, SimConfig,
};
use cadence_event::Direction;
use cadence_integ::IntegratorKind;
use cadence_job::{JobClass, JobSpec};
use cadence_test_utils::{Altitude, BounceJob, CountingJob, FreeFall};
use tracing_subscriber::EnvFilter;

fn config() -> SimConfig {
    SimConfig::new(0.02)
        .state(StateDef::second_order("ball", &[10.0], &[0.0]))
        .integration_loop(LoopDef::new("flight", 0.002, IntegratorKind::Rk4).state("ball"))
        .derivative("gravity", "ball", FreeFall { gravity: 9.81 })
        .event(
            EventDef::new("touchdown", "ball", Altitude)
                .direction(Direction::Falling)
                .handler(BounceJob::new("ball", 0.8)),
        )
        .job(JobSpec::new("logger", JobClass::Log), CountingJob::new("logger"))
        .stop_at(6.0)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Cadence Bouncing Ball Example ===\n");

    // --- Paced run on a worker thread, four times faster than real time ---
    let paced = config().realtime(RealtimeConfig {
        enabled: true,
        ratio: 4.0,
        policy: OverrunPolicy::CatchUp,
    });
    let mut exec = Executive::new(paced).unwrap();
    let (sink, frames) = ChannelSink::bounded(1024);
    exec.set_telemetry(sink);
    let worker = ExecutiveThread::spawn(exec).unwrap();
    let control = worker.handle();

    std::thread::sleep(Duration::from_millis(300));
    let receipt = control.submit(ControlCommand::Freeze).unwrap();
    println!("Freeze accepted={} at frame {:?}", receipt.accepted, receipt.applied_frame);
    let receipt = control.submit(ControlCommand::Step { frames: 5 }).unwrap();
    println!("Step 5 accepted={} at frame {:?}", receipt.accepted, receipt.applied_frame);
    control.submit(ControlCommand::Resume).unwrap();

    let (exec, result) = worker.join().unwrap();
    let summary = result.unwrap();

    let mut impacts = 0;
    for frame in frames.try_iter() {
        for firing in &frame.firings {
            impacts += 1;
            println!(
                "  frame {:>3}: {} at t={:.6}s (residual {:+.2e})",
                frame.frame.0, firing.event, firing.time, firing.value
            );
        }
    }
    println!(
        "\nRun finished: {} frames, t={:.2}s, {} impacts, {} overruns, max lag {:.3?}",
        summary.frames, summary.time, impacts, summary.overruns, summary.max_lag
    );
    assert_eq!(exec.mode(), ExecMode::Terminated);

    // --- Capture mid-flight and resume in a fresh executive ---
    println!("\nCapture/restore:");
    let mut source = Executive::new(config()).unwrap();
    for _ in 0..80 {
        source.step_frame().unwrap();
    }
    let blob = source.capture_state().unwrap();
    println!("  captured {} bytes at frame {}", blob.as_bytes().len(), source.frame().0);

    let mut resumed = Executive::new(config()).unwrap();
    resumed.restore_state(blob.as_bytes()).unwrap();
    for _ in 0..40 {
        source.step_frame().unwrap();
        resumed.step_frame().unwrap();
    }
    println!(
        "  after 40 more frames: original x={:.9}, resumed x={:.9}",
        source.state("ball").unwrap()[0],
        resumed.state("ball").unwrap()[0],
    );
    assert_eq!(source.state("ball"), resumed.state("ball"));

    println!("\n=== Done ===");
}
