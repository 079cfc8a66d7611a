//! Job traits, job classes, and the job registry.
//!
//! A *job* is a unit of work the executive calls on a schedule. Every
//! job has a [`JobClass`] that fixes its position in the frame, a phase
//! that orders it within the class, and a [`Cycle`](cadence_core::Cycle)
//! that sets how often it runs.
//!
//! Three callable shapes exist:
//!
//! | Trait | Called by | Mutates |
//! |-------|-----------|---------|
//! | [`Job`] | frame scheduler, loop hooks, event triggers | anything via [`JobContext`] |
//! | [`DerivativeJob`] | integration loops, once per stage | its own derivative slot |
//! | [`EventCondition`] | event detector | nothing |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod class;
pub mod context;
pub mod error;
pub mod job;
pub mod registry;
pub mod view;

pub use class::{JobClass, ReturnPolicy};
pub use context::{EventFiring, JobContext, Requests};
pub use error::RegistrationError;
pub use job::{
    condition_fn, derivative_fn, job_fn, DerivativeJob, EventCondition, FnCondition, FnDerivative,
    FnJob, Job,
};
pub use registry::{JobBody, JobEntry, JobRegistry, JobSchedule, JobSpec};
pub use view::{LayoutEntry, StageView, StateLayout};
