//! Wall-clock pacing.
//!
//! [`RealtimeSync`] maps simulation time onto wall time through an epoch
//! pair and a ratio:
//!
//! ```text
//! target(sim) = wall_epoch + (sim - sim_epoch) / ratio
//! ```
//!
//! After every frame the executive calls
//! [`sync_frame()`](RealtimeSync::sync_frame). Ahead of schedule, it
//! sleeps until the target. Behind schedule, it never sleeps and never
//! skips frames; it counts an overrun and reports the lag.

use std::time::Duration;

use cadence_core::WallClock;

/// What the schedule does after an overrun.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverrunPolicy {
    /// Keep the absolute schedule: later frames run without sleeping
    /// until wall time is back on target.
    #[default]
    CatchUp,
    /// Re-anchor the schedule at the late frame, so the lost wall time
    /// is never made up.
    Rebase,
}

/// Outcome of pacing one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Wall time was past the frame's target.
    pub overrun: bool,
    /// Time spent sleeping.
    pub slept: Duration,
    /// How far past the target wall time was. Zero unless `overrun`.
    pub lag: Duration,
}

/// Real-time clock state.
#[derive(Clone, Debug)]
pub struct RealtimeSync {
    enabled: bool,
    ratio: f64,
    policy: OverrunPolicy,
    wall_epoch: Duration,
    sim_epoch: f64,
    overruns: u64,
    last_lag: Duration,
    max_lag: Duration,
}

impl RealtimeSync {
    /// Pacing at `ratio` simulated seconds per wall second.
    pub fn new(enabled: bool, ratio: f64, policy: OverrunPolicy) -> Self {
        Self {
            enabled,
            ratio,
            policy,
            wall_epoch: Duration::ZERO,
            sim_epoch: 0.0,
            overruns: 0,
            last_lag: Duration::ZERO,
            max_lag: Duration::ZERO,
        }
    }

    /// Whether frames are paced.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current ratio.
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Overrun policy.
    pub fn policy(&self) -> OverrunPolicy {
        self.policy
    }

    /// Overruns counted so far.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Lag of the most recent overrun.
    pub fn last_lag(&self) -> Duration {
        self.last_lag
    }

    /// Largest lag seen.
    pub fn max_lag(&self) -> Duration {
        self.max_lag
    }

    /// Anchor the schedule: `sim` seconds corresponds to now.
    pub fn rebase(&mut self, clock: &dyn WallClock, sim: f64) {
        self.wall_epoch = clock.now();
        self.sim_epoch = sim;
    }

    /// Change the ratio, re-anchoring at `sim` so the change does not
    /// move frames already paced.
    pub fn set_ratio(&mut self, ratio: f64, clock: &dyn WallClock, sim: f64) {
        self.ratio = ratio;
        self.rebase(clock, sim);
    }

    /// Wall time at which `sim` should be reached.
    pub fn target(&self, sim: f64) -> Duration {
        let offset = ((sim - self.sim_epoch) / self.ratio).max(0.0);
        self.wall_epoch + Duration::from_secs_f64(offset)
    }

    /// Pace the frame that just reached `sim` seconds.
    pub fn sync_frame(&mut self, clock: &mut dyn WallClock, sim: f64) -> SyncOutcome {
        if !self.enabled {
            return SyncOutcome::default();
        }
        let target = self.target(sim);
        let now = clock.now();
        if now <= target {
            let wait = target - now;
            if !wait.is_zero() {
                clock.sleep(wait);
            }
            return SyncOutcome {
                overrun: false,
                slept: wait,
                lag: Duration::ZERO,
            };
        }

        let lag = now - target;
        self.overruns += 1;
        self.last_lag = lag;
        self.max_lag = self.max_lag.max(lag);
        tracing::warn!(
            sim_time = sim,
            lag_ms = lag.as_secs_f64() * 1e3,
            overruns = self.overruns,
            "real-time overrun"
        );
        if self.policy == OverrunPolicy::Rebase {
            self.rebase(clock, sim);
        }
        SyncOutcome {
            overrun: true,
            slept: Duration::ZERO,
            lag,
        }
    }
}
