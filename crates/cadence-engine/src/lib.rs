//! Simulation executive for Cadence.
//!
//! Provides the [`Executive`], which owns the state store, the job
//! registry, the integration loops and the event table, and drives them
//! frame by frame:
//!
//! - **Frame scheduling**: jobs run by class and phase, each at its own
//!   cycle, with integer-tic time so rates never drift.
//! - **Multi-rate integration**: loops nest, a child stepping several
//!   times per parent step; state events are located inside a step by
//!   regula falsi and the step is redone up to the crossing.
//! - **Pacing**: the [`RealtimeSync`] holds frames to a wall clock at a
//!   configurable ratio, detecting and reporting overruns.
//! - **Control**: freeze, resume, single-step, rate changes and job
//!   toggles arrive through a [`ControlHandle`] and apply at frame
//!   boundaries.
//! - **Snapshots**: [`Executive::capture_state`] and
//!   [`Executive::restore_state`] resume a run bit for bit.
//!
//! Drive an executive directly with [`Executive::step_frame`], or move
//! it onto its own thread with [`ExecutiveThread`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod control;
mod dispatch;
pub mod events;
pub mod executive;
pub mod integ_loop;
pub mod metrics;
pub mod realtime;
pub mod snapshot;
pub mod telemetry;
pub mod threaded;

pub use config::{
    ConfigError, DerivativeDef, EventDef, ExecLimits, JobDef, LoopDef, RealtimeConfig, SimConfig,
};
pub use control::ControlHandle;
pub use events::EventStatus;
pub use executive::{ExecMode, Executive, RunSummary};
pub use integ_loop::{LoopPhase, LoopStatus};
pub use metrics::FrameMetrics;
pub use realtime::{OverrunPolicy, RealtimeSync, SyncOutcome};
pub use snapshot::{CaptureError, RestoreError};
pub use telemetry::{
    ChannelSink, FiringRecord, FrameTelemetry, JobErrorRecord, MemorySink, NullSink,
    TelemetrySink, WarningRecord,
};
pub use threaded::{ExecutiveThread, ThreadError};
