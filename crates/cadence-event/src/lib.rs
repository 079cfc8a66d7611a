//! Zero-crossing event detection.
//!
//! The [`EventDetector`] brackets a sign change of a scalar condition
//! across a step and narrows it with the Illinois variant of regula
//! falsi until the bracket is no wider than the configured tolerance.
//! The caller supplies the condition as a function of time, typically
//! by re-integrating from the start of the step to the probe time.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod detector;

pub use detector::{ConvergenceWarning, Crossing, Direction, EventDetector};
