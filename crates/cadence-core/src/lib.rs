//! Core types for the Cadence simulation executive.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared across the workspace: strongly-typed IDs,
//! integer simulation time and frame cycles, the state vector store,
//! control commands, the wall-clock abstraction, and error types.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod clock;
pub mod command;
pub mod error;
pub mod id;
pub mod state;
pub mod time;

pub use clock::{SystemClock, WallClock};
pub use command::{ControlCommand, Receipt};
pub use error::{ControlError, ExecError, JobError};
pub use id::{EventId, FrameId, JobId, LoopId, StateId};
pub use state::{Order, StateDef, StateStore, StateVector};
pub use time::{Cycle, Frame, SimTime, TimeBase};
