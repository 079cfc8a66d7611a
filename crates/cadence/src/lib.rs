//! Cadence: a real-time simulation executive.
//!
//! This is the top-level facade crate that re-exports the public API from all
//! Cadence sub-crates. For most users, adding `cadence` as a single dependency
//! is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use cadence::prelude::*;
//!
//! // x' = -x, integrated with RK4 at four steps per 0.1 s frame.
//! let config = SimConfig::new(0.1)
//!     .state(StateDef::first_order("x", vec![1.0]))
//!     .integration_loop(LoopDef::new("main", 0.025, IntegratorKind::Rk4).state("x"))
//!     .derivative(
//!         "decay",
//!         "x",
//!         derivative_fn(|view, dxdt| {
//!             dxdt[0] = -view.own()[0];
//!             Ok(())
//!         }),
//!     )
//!     .job(
//!         JobSpec::new("report", JobClass::Log).cycle(Cycle::frames(5)),
//!         job_fn("report", |_ctx| Ok(())),
//!     )
//!     .stop_at(1.0);
//!
//! let mut exec = Executive::new(config).unwrap();
//! let summary = exec.run().unwrap();
//! assert_eq!(summary.frames, 10);
//! let x = exec.state("x").unwrap()[0];
//! assert!((x - (-1.0f64).exp()).abs() < 1e-6);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `cadence-core` | Time, IDs, state store, commands, errors |
//! | [`job`] | `cadence-job` | Job traits, job classes and the registry |
//! | [`integ`] | `cadence-integ` | Integration strategies and step control |
//! | [`event`] | `cadence-event` | Zero-crossing detection |
//! | [`snapshot`] | `cadence-snapshot` | Checkpoint images and their binary codec |
//! | [`engine`] | `cadence-engine` | The executive, loops, pacing and telemetry |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types (`cadence-core`).
///
/// Simulation time in integer tics, frame cycles, the state store, control
/// commands and receipts, and the error types shared by every crate.
pub use cadence_core as types;

/// Jobs and the job registry (`cadence-job`).
///
/// The [`job::Job`], [`job::DerivativeJob`] and [`job::EventCondition`]
/// traits are the main extension points for user simulation code.
pub use cadence_job as job;

/// Integration strategies (`cadence-integ`).
///
/// [`integ::Integrator`] advances a state buffer by one step with any
/// [`integ::IntegratorKind`], fixed-step or adaptive.
pub use cadence_integ as integ;

/// Zero-crossing detection (`cadence-event`).
pub use cadence_event as event;

/// Checkpoint images (`cadence-snapshot`).
///
/// Most users go through `Executive::capture_state` and
/// `Executive::restore_state`; this module exposes the image itself for
/// inspection and comparison.
pub use cadence_snapshot as snapshot;

/// The simulation executive (`cadence-engine`).
///
/// [`engine::Executive`] steps frames on the caller's thread;
/// [`engine::ExecutiveThread`] runs one on a dedicated thread.
pub use cadence_engine as engine;

/// Common imports for typical Cadence usage.
///
/// ```rust
/// use cadence::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use cadence_core::{
        ControlCommand, Cycle, FrameId, JobError, Receipt, SimTime, StateDef, TimeBase,
    };

    // Errors
    pub use cadence_core::{ControlError, ExecError};

    // Jobs
    pub use cadence_job::{
        condition_fn, derivative_fn, job_fn, DerivativeJob, EventCondition, Job, JobClass,
        JobContext, JobSpec, ReturnPolicy, StageView,
    };

    // Integration and events
    pub use cadence_event::Direction;
    pub use cadence_integ::{AdaptiveConfig, IntegratorKind};

    // Engine
    pub use cadence_engine::{
        ControlHandle, EventDef, ExecMode, Executive, ExecutiveThread, LoopDef, OverrunPolicy,
        RealtimeConfig, RunSummary, SimConfig,
    };
}
