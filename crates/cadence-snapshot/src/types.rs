//! Snapshot image records.
//!
//! Records identify their subject by name so a restore can verify that
//! the image belongs to the registry it is applied to. Times are in
//! integer tics; enum-valued fields are stored as their stable tags.

/// An encoded snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob(pub Vec<u8>);

impl Blob {
    /// Encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encoded length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the blob holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Take the bytes out of the blob.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Blob {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Everything needed to resume a run at a frame boundary.
///
/// # Examples
///
/// ```
/// use cadence_snapshot::{decode_image, encode_image, SnapshotImage, StateRecord};
///
/// let image = SnapshotImage {
///     fingerprint: 7,
///     frame: 3,
///     time_tics: 300,
///     states: vec![StateRecord {
///         name: "x".into(),
///         values: vec![1.0, 2.0],
///         derivs: vec![0.0, 0.0],
///     }],
///     ..SnapshotImage::default()
/// };
///
/// let blob = encode_image(&image).unwrap();
/// assert_eq!(decode_image(blob.as_bytes()).unwrap(), image);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SnapshotImage {
    /// Hash of the configuration the image was taken from.
    pub fingerprint: u64,
    /// Executive mode tag at capture.
    pub mode: u8,
    /// Frame counter.
    pub frame: u64,
    /// Simulation time at the frame boundary.
    pub time_tics: i64,
    /// Target real-time ratio.
    pub realtime_ratio: f64,
    /// Frames still to run from a pending single-step request.
    pub pending_steps: u64,
    /// Job scheduling metadata in job id order.
    pub jobs: Vec<JobRecord>,
    /// Integration loop memory in loop id order.
    pub loops: Vec<LoopRecord>,
    /// Event state in event id order.
    pub events: Vec<EventRecord>,
    /// State vectors in state id order.
    pub states: Vec<StateRecord>,
}

/// Scheduling metadata of one job.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JobRecord {
    /// Job name.
    pub name: String,
    /// Job class tag.
    pub class: u8,
    /// Phase within the class.
    pub phase: u32,
    /// Cycle numerator, in frames.
    pub cycle_num: u32,
    /// Cycle denominator.
    pub cycle_den: u32,
    /// Next due time.
    pub next_call: i64,
    /// Time of the last run, if any.
    pub last_call: Option<i64>,
    /// Enabled flag.
    pub enabled: bool,
    /// Skipped after a degraded failure.
    pub degraded: bool,
    /// Successful and failed runs.
    pub run_count: u64,
    /// Failed runs.
    pub error_count: u64,
}

/// Integrator memory of one integration loop.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoopRecord {
    /// Loop name.
    pub name: String,
    /// Loop time at capture.
    pub time_tics: i64,
    /// Adaptive step proposal carried to the next step.
    pub h_next: Option<f64>,
    /// Step size of the multistep history.
    pub history_h: f64,
    /// Multistep derivative history, newest first.
    pub history: Vec<Vec<f64>>,
    /// Accepted steps so far.
    pub steps: u64,
}

/// Detection state of one event.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventRecord {
    /// Event name.
    pub name: String,
    /// Enabled flag.
    pub enabled: bool,
    /// Skipped after a degraded handler failure.
    pub degraded: bool,
    /// Condition value at the end of the last step.
    pub last_value: Option<f64>,
    /// Number of firings so far.
    pub fire_count: u64,
    /// Time (seconds) of the most recent firing.
    pub last_fired: Option<f64>,
}

/// Values and derivatives of one state vector.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateRecord {
    /// State vector name.
    pub name: String,
    /// Current values.
    pub values: Vec<f64>,
    /// Current derivatives.
    pub derivs: Vec<f64>,
}
