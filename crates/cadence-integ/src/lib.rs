//! Numerical integrator strategies.
//!
//! Every strategy advances a contiguous state buffer over a time step
//! through one contract, [`Integrator::advance`]. The strategy is a
//! closed set of variants selected by [`IntegratorKind`]; dispatch is by
//! tag, not by trait object.
//!
//! | Kind | Order | Evaluations/step | Step control |
//! |------|-------|------------------|--------------|
//! | `Euler` | 1 | 1 | fixed |
//! | `EulerCromer` | 1 (symplectic) | 1 | fixed |
//! | `Rk2` | 2 | 2 | fixed |
//! | `Rk4` | 4 | 4 | fixed |
//! | `Rkg4` | 4 | 4 | fixed |
//! | `Rkf45` | 5(4) | 6 | adaptive |
//! | `Rkf78` | 8(7) | 13 | adaptive |
//! | `Abm4` | 4 | 2 (4 while starting) | fixed, multistep |
//!
//! Adaptive strategies split a step into accepted substeps, retrying
//! rejected substeps at a smaller size through a bounded retry state
//! machine ([`RetryState`]).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod adaptive;
pub mod error;
pub mod kind;
pub mod multistep;
pub mod strategy;
pub mod tableau;

pub use adaptive::{AdaptiveConfig, RetryState, StepOutcome};
pub use error::IntegError;
pub use kind::IntegratorKind;
pub use multistep::AbmHistory;
pub use strategy::{
    AdvanceReport, DerivativeSource, Integrator, IntegratorMemory, Segment, StepMode,
};
pub use tableau::Tableau;
