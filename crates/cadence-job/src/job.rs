//! The [`Job`], [`DerivativeJob`] and [`EventCondition`] traits.

use cadence_core::JobError;

use crate::context::JobContext;
use crate::view::StageView;

/// A unit of work called by the executive.
///
/// # Contract
///
/// - `run()` executes on the executive thread, between or inside
///   integration steps depending on the job's class.
/// - Returning `Err` reports a non-zero return code; the job's
///   [`ReturnPolicy`](crate::ReturnPolicy) decides what follows.
///
/// # Examples
///
/// ```
/// use cadence_core::JobError;
/// use cadence_job::{Job, JobContext};
///
/// struct Heartbeat {
///     beats: u64,
/// }
///
/// impl Job for Heartbeat {
///     fn name(&self) -> &str { "heartbeat" }
///
///     fn run(&mut self, _ctx: &mut JobContext<'_>) -> Result<(), JobError> {
///         self.beats += 1;
///         Ok(())
///     }
/// }
///
/// let job = Heartbeat { beats: 0 };
/// assert_eq!(job.name(), "heartbeat");
/// ```
pub trait Job: Send {
    /// Name for logs and telemetry.
    fn name(&self) -> &str;

    /// Execute the job once.
    fn run(&mut self, ctx: &mut JobContext<'_>) -> Result<(), JobError>;
}

/// Derivative evaluation for one state vector.
///
/// Called once per integrator stage with the stage time and stage
/// values. Must be side-effect free apart from writing `dydt`, which
/// has the length of the owning vector. Evaluations of different
/// vectors may run in parallel, hence `Sync`.
pub trait DerivativeJob: Send + Sync {
    /// Write `d(own)/dt` into `dydt`.
    fn evaluate(&self, view: &StageView<'_>, dydt: &mut [f64]) -> Result<(), JobError>;
}

/// A scalar condition whose zero crossings are events.
pub trait EventCondition: Send + Sync {
    /// Condition value at the viewed stage.
    fn evaluate(&self, view: &StageView<'_>) -> f64;
}

// ── Closure adapters ───────────────────────────────────────────────

/// A [`Job`] backed by a closure. Built by [`job_fn`].
pub struct FnJob<F> {
    name: String,
    f: F,
}

/// Wrap a closure as a named job.
pub fn job_fn<F>(name: impl Into<String>, f: F) -> FnJob<F>
where
    F: FnMut(&mut JobContext<'_>) -> Result<(), JobError> + Send,
{
    FnJob {
        name: name.into(),
        f,
    }
}

impl<F> Job for FnJob<F>
where
    F: FnMut(&mut JobContext<'_>) -> Result<(), JobError> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: &mut JobContext<'_>) -> Result<(), JobError> {
        (self.f)(ctx)
    }
}

/// A [`DerivativeJob`] backed by a closure. Built by [`derivative_fn`].
pub struct FnDerivative<F>(F);

/// Wrap a closure as a derivative job.
pub fn derivative_fn<F>(f: F) -> FnDerivative<F>
where
    F: Fn(&StageView<'_>, &mut [f64]) -> Result<(), JobError> + Send + Sync,
{
    FnDerivative(f)
}

impl<F> DerivativeJob for FnDerivative<F>
where
    F: Fn(&StageView<'_>, &mut [f64]) -> Result<(), JobError> + Send + Sync,
{
    fn evaluate(&self, view: &StageView<'_>, dydt: &mut [f64]) -> Result<(), JobError> {
        (self.0)(view, dydt)
    }
}

/// An [`EventCondition`] backed by a closure. Built by [`condition_fn`].
pub struct FnCondition<F>(F);

/// Wrap a closure as an event condition.
pub fn condition_fn<F>(f: F) -> FnCondition<F>
where
    F: Fn(&StageView<'_>) -> f64 + Send + Sync,
{
    FnCondition(f)
}

impl<F> EventCondition for FnCondition<F>
where
    F: Fn(&StageView<'_>) -> f64 + Send + Sync,
{
    fn evaluate(&self, view: &StageView<'_>) -> f64 {
        (self.0)(view)
    }
}
