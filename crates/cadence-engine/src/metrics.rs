//! Per-frame performance counters.
//!
//! [`FrameMetrics`] captures timing and integration work for a single
//! frame. The executive fills it in during `step_frame()` and attaches
//! it to the frame's telemetry record.

/// Timing and work counters collected during a single frame.
///
/// All durations are in microseconds of wall time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameMetrics {
    /// Wall time for the entire frame.
    pub total_us: u64,
    /// Time spent applying control commands.
    pub control_us: u64,
    /// Per-class job execution times: `(class name, microseconds)`.
    pub class_us: Vec<(&'static str, u64)>,
    /// Time spent inside integration loops, including derivative jobs,
    /// hooks and event handling.
    pub integration_us: u64,
    /// Time spent sleeping for real-time pacing.
    pub sync_wait_us: u64,
    /// Derivative evaluations across all loops.
    pub evaluations: u64,
    /// Accepted integrator substeps across all loops.
    pub substeps: u64,
    /// Rejected adaptive attempts across all loops.
    pub rejections: u64,
    /// Event firings across all loops.
    pub firings: u64,
}

impl FrameMetrics {
    pub(crate) fn record_class(&mut self, class: &'static str, us: u64) {
        if us == 0 {
            return;
        }
        match self.class_us.iter_mut().find(|(c, _)| *c == class) {
            Some((_, total)) => *total += us,
            None => self.class_us.push((class, us)),
        }
    }
}
