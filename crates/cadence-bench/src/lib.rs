//! Benchmark profiles for the Cadence simulation executive.
//!
//! Provides pre-built [`SimConfig`] profiles for benchmarks and examples:
//!
//! - [`decay_profile`]: one wide first-order vector under exponential decay
//! - [`bouncing_profile`]: independent bouncing balls, one event each
//! - [`cascade_profile`]: three nested loops at 100 Hz, 1 kHz and 10 kHz

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use cadence_core::StateDef;
use cadence_engine::{EventDef, LoopDef, SimConfig};
use cadence_event::Direction;
use cadence_integ::IntegratorKind;
use cadence_job::{JobClass, JobSpec};
use cadence_test_utils::{Altitude, BounceJob, CountingJob, DecayDerivative, FreeFall};

/// Frame duration used by every profile, in seconds.
pub const FRAME: f64 = 0.01;

/// `dim` decaying values integrated by `kind` at four steps per frame.
///
/// With `parallel`, each element is its own state vector so derivatives
/// fan out across the rayon pool.
pub fn decay_profile(dim: usize, kind: IntegratorKind, parallel: bool) -> SimConfig {
    let mut config = SimConfig::new(FRAME);
    let mut main = LoopDef::new("main", FRAME / 4.0, kind);
    if parallel {
        for i in 0..dim {
            let name = format!("x{i}");
            config = config.state(StateDef::first_order(name.clone(), vec![1.0]));
            main = main.state(name.clone());
            config = config.derivative(
                format!("decay{i}"),
                name,
                DecayDerivative {
                    rate: 1.0 + i as f64 * 1e-3,
                },
            );
        }
        main = main.parallel();
    } else {
        config = config
            .state(StateDef::first_order("x", vec![1.0; dim]))
            .derivative("decay", "x", DecayDerivative { rate: 1.0 });
        main = main.state("x");
    }
    config
        .integration_loop(main)
        .job(JobSpec::new("log", JobClass::Log), CountingJob::new("log"))
}

/// `balls` balls dropped from staggered heights, each bouncing off the
/// ground with restitution 0.9.
pub fn bouncing_profile(balls: usize) -> SimConfig {
    let mut config = SimConfig::new(FRAME);
    let mut flight = LoopDef::new("flight", FRAME / 10.0, IntegratorKind::EulerCromer);
    for i in 0..balls {
        let name = format!("ball{i}");
        let height = 1.0 + (i % 10) as f64 * 0.5;
        config = config
            .state(StateDef::second_order(name.clone(), &[height], &[0.0]))
            .derivative(format!("gravity{i}"), name.clone(), FreeFall { gravity: 9.81 })
            .event(
                EventDef::new(format!("touchdown{i}"), name.clone(), Altitude)
                    .direction(Direction::Falling)
                    .handler(BounceJob::new(name.clone(), 0.9)),
            );
        flight = flight.state(name);
    }
    config.integration_loop(flight)
}

/// A three-level cascade: a 100 Hz body, a 1 kHz actuator and a 10 kHz
/// sensor loop, each integrating a small decaying vector.
pub fn cascade_profile() -> SimConfig {
    SimConfig::new(FRAME)
        .state(StateDef::first_order("body", vec![1.0; 12]))
        .state(StateDef::first_order("actuator", vec![1.0; 4]))
        .state(StateDef::first_order("sensor", vec![1.0; 2]))
        .integration_loop(LoopDef::new("body", FRAME, IntegratorKind::Rk4).state("body"))
        .integration_loop(
            LoopDef::new("actuator", FRAME / 10.0, IntegratorKind::Rk2)
                .state("actuator")
                .child_of("body"),
        )
        .integration_loop(
            LoopDef::new("sensor", FRAME / 100.0, IntegratorKind::Euler)
                .state("sensor")
                .child_of("actuator"),
        )
        .derivative("body-dyn", "body", DecayDerivative { rate: 0.5 })
        .derivative("actuator-dyn", "actuator", DecayDerivative { rate: 5.0 })
        .derivative("sensor-dyn", "sensor", DecayDerivative { rate: 50.0 })
}
