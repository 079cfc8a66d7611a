//! Running an executive on its own thread.
//!
//! [`ExecutiveThread`] moves an [`Executive`] onto a dedicated thread
//! that calls [`Executive::run`]. Other threads steer it through a
//! [`ControlHandle`] and get the executive back, with the run result,
//! from [`join()`](ExecutiveThread::join).

use std::fmt;
use std::io;
use std::thread::{self, JoinHandle};

use cadence_core::{ControlCommand, ExecError};

use crate::control::ControlHandle;
use crate::executive::{Executive, RunSummary};

/// Errors from spawning or joining the executive thread.
#[derive(Debug)]
pub enum ThreadError {
    /// The OS refused to create the thread.
    Spawn(io::Error),
    /// The executive thread panicked. The executive is lost.
    Panicked,
}

impl fmt::Display for ThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn(e) => write!(f, "failed to spawn executive thread: {e}"),
            Self::Panicked => write!(f, "executive thread panicked"),
        }
    }
}

impl std::error::Error for ThreadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn(e) => Some(e),
            Self::Panicked => None,
        }
    }
}

type ThreadResult = (Executive, Result<RunSummary, ExecError>);

/// An executive running on a dedicated thread.
///
/// Dropping the handle without joining commands a shutdown and waits
/// for the thread to finish.
pub struct ExecutiveThread {
    control: ControlHandle,
    thread: Option<JoinHandle<ThreadResult>>,
}

impl ExecutiveThread {
    /// Move `exec` onto a thread named `cadence-exec` and start running.
    pub fn spawn(mut exec: Executive) -> Result<Self, ThreadError> {
        let control = exec.control_handle();
        let thread = thread::Builder::new()
            .name("cadence-exec".into())
            .spawn(move || {
                let result = exec.run();
                (exec, result)
            })
            .map_err(ThreadError::Spawn)?;
        tracing::debug!("executive thread started");
        Ok(Self {
            control,
            thread: Some(thread),
        })
    }

    /// A handle for posting control commands.
    pub fn handle(&self) -> ControlHandle {
        self.control.clone()
    }

    /// Whether the run has finished.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Command a shutdown and wait for the executive.
    pub fn shutdown(self) -> Result<ThreadResult, ThreadError> {
        // Fails only when the run is already over.
        let _ = self.control.post(ControlCommand::Shutdown);
        self.join()
    }

    /// Wait for the run to end and take the executive back.
    pub fn join(mut self) -> Result<ThreadResult, ThreadError> {
        match self.thread.take() {
            Some(handle) => handle.join().map_err(|_| ThreadError::Panicked),
            None => Err(ThreadError::Panicked),
        }
    }
}

impl Drop for ExecutiveThread {
    fn drop(&mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = self.control.post(ControlCommand::Shutdown);
            if handle.join().is_err() {
                tracing::error!("executive thread panicked");
            }
        }
    }
}

impl fmt::Debug for ExecutiveThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutiveThread")
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::StateDef;
    use cadence_integ::IntegratorKind;
    use cadence_test_utils::DecayDerivative;

    use crate::config::{LoopDef, SimConfig};
    use crate::executive::ExecMode;

    fn config() -> SimConfig {
        SimConfig::new(0.01)
            .state(StateDef::first_order("x", vec![1.0]))
            .integration_loop(LoopDef::new("main", 0.01, IntegratorKind::Euler).state("x"))
            .derivative("decay", "x", DecayDerivative { rate: 1.0 })
    }

    #[test]
    fn runs_to_stop_time_and_returns_executive() {
        let runner = ExecutiveThread::spawn(Executive::new(config().stop_at(0.5)).unwrap())
            .unwrap();
        let (exec, result) = runner.join().unwrap();
        let summary = result.unwrap();
        assert_eq!(summary.frames, 50);
        assert_eq!(exec.mode(), ExecMode::Terminated);
    }

    #[test]
    fn shutdown_command_ends_a_frozen_run() {
        let runner =
            ExecutiveThread::spawn(Executive::new(config().frozen_start()).unwrap()).unwrap();
        let (exec, result) = runner.shutdown().unwrap();
        assert!(result.is_ok());
        assert_eq!(exec.mode(), ExecMode::Terminated);
        assert_eq!(exec.frame().0, 0);
    }
}
