//! Per-frame telemetry records and sinks.
//!
//! After every executed frame the executive builds one
//! [`FrameTelemetry`] and hands it to the configured [`TelemetrySink`].
//! Sinks must not block the frame loop.

use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use cadence_core::{FrameId, JobId, Receipt};
use cadence_event::ConvergenceWarning;
use cadence_job::JobClass;

use crate::executive::ExecMode;
use crate::metrics::FrameMetrics;

/// A job failure observed during a frame.
#[derive(Clone, Debug, PartialEq)]
pub struct JobErrorRecord {
    /// The failing job, or `None` for event handlers.
    pub job: Option<JobId>,
    /// Job or event name.
    pub name: String,
    /// Class of the job.
    pub class: JobClass,
    /// Return code.
    pub code: i32,
    /// Reason reported by the job.
    pub reason: String,
    /// Whether the failure stopped the executive.
    pub fatal: bool,
}

/// An event refinement that stopped at its iteration limit.
#[derive(Clone, Debug, PartialEq)]
pub struct WarningRecord {
    /// The event.
    pub event: String,
    /// Simulation time (seconds) of the reported crossing.
    pub time: f64,
    /// The detector's warning.
    pub warning: ConvergenceWarning,
}

/// An event firing.
#[derive(Clone, Debug, PartialEq)]
pub struct FiringRecord {
    /// The event.
    pub event: String,
    /// Located crossing time in seconds.
    pub time: f64,
    /// Condition value at the crossing time.
    pub value: f64,
}

/// Everything that happened in one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameTelemetry {
    /// Frame counter after the frame.
    pub frame: FrameId,
    /// Simulation time in seconds after the frame.
    pub time: f64,
    /// Mode after the frame.
    pub mode: ExecMode,
    /// The frame overran its real-time budget.
    pub overrun: bool,
    /// How far wall time was past its target, in seconds. Zero when on
    /// schedule or unpaced.
    pub lag: f64,
    /// Job failures.
    pub job_errors: Vec<JobErrorRecord>,
    /// Event refinement warnings.
    pub warnings: Vec<WarningRecord>,
    /// Event firings, in firing order.
    pub firings: Vec<FiringRecord>,
    /// Receipts of the control commands applied at this frame boundary.
    pub receipts: Vec<Receipt>,
    /// Timing and work counters.
    pub metrics: FrameMetrics,
}

impl FrameTelemetry {
    pub(crate) fn new(frame: FrameId, time: f64, mode: ExecMode) -> Self {
        Self {
            frame,
            time,
            mode,
            overrun: false,
            lag: 0.0,
            job_errors: Vec::new(),
            warnings: Vec::new(),
            firings: Vec::new(),
            receipts: Vec::new(),
            metrics: FrameMetrics::default(),
        }
    }
}

/// Receiver of per-frame telemetry.
pub trait TelemetrySink: Send {
    /// Called once at the end of every executed frame.
    fn record(&mut self, frame: &FrameTelemetry);
}

/// Sink that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn record(&mut self, _frame: &FrameTelemetry) {}
}

// ── ChannelSink ────────────────────────────────────────────────────

/// Forwards telemetry over a bounded channel.
///
/// When the consumer falls behind, records are dropped rather than
/// stalling the frame loop; [`dropped()`](Self::dropped) counts them.
pub struct ChannelSink {
    tx: Sender<FrameTelemetry>,
    dropped: u64,
}

impl ChannelSink {
    /// A sink with a `capacity`-record buffer, and the receiving end.
    pub fn bounded(capacity: usize) -> (Self, Receiver<FrameTelemetry>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        (Self { tx, dropped: 0 }, rx)
    }

    /// Records dropped because the channel was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl TelemetrySink for ChannelSink {
    fn record(&mut self, frame: &FrameTelemetry) {
        match self.tx.try_send(frame.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
                tracing::trace!(frame = %frame.frame, dropped = self.dropped, "telemetry dropped");
            }
        }
    }
}

// ── MemorySink ─────────────────────────────────────────────────────

/// Keeps every record in a shared buffer.
///
/// Clones share the buffer, so a test can keep one handle and give the
/// executive the other.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    frames: Arc<Mutex<Vec<FrameTelemetry>>>,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn frames(&self) -> Vec<FrameTelemetry> {
        self.frames.lock().map(|f| f.clone()).unwrap_or_default()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.frames.lock().map(|f| f.len()).unwrap_or(0)
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TelemetrySink for MemorySink {
    fn record(&mut self, frame: &FrameTelemetry) {
        if let Ok(mut frames) = self.frames.lock() {
            frames.push(frame.clone());
        }
    }
}
