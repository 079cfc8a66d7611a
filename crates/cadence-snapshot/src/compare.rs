//! Image comparison.
//!
//! Hash-first: equal [`state_hash`]es and equal scheduling records mean
//! no divergence. Otherwise every record is compared and each difference
//! is reported, with state vectors compared bit-exactly per element.

use crate::hash::state_hash;
use crate::types::SnapshotImage;

/// Part of the image a divergence was found in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DivergenceKind {
    /// Frame counter, time or fingerprint.
    Header,
    /// A state vector value or derivative.
    State,
    /// Job scheduling metadata.
    Job,
    /// Integration loop memory.
    Loop,
    /// Event detection state.
    Event,
}

/// One difference between two images.
#[derive(Clone, Debug, PartialEq)]
pub struct Divergence {
    /// Where the difference is.
    pub kind: DivergenceKind,
    /// Name of the record, or of the header field.
    pub name: String,
    /// Element index within a state vector, when applicable.
    pub index: Option<usize>,
    /// Recorded value, rendered for display.
    pub recorded: String,
    /// Replayed value, rendered for display.
    pub replayed: String,
}

/// All differences found between a recorded and a replayed image.
#[derive(Clone, Debug, PartialEq)]
pub struct DivergenceReport {
    /// Frame of the recorded image.
    pub frame: u64,
    /// Individual differences, header first, then states, jobs, loops
    /// and events.
    pub divergences: Vec<Divergence>,
}

struct Collector {
    out: Vec<Divergence>,
}

impl Collector {
    fn check<T: PartialEq + std::fmt::Debug>(
        &mut self,
        kind: DivergenceKind,
        name: &str,
        index: Option<usize>,
        recorded: &T,
        replayed: &T,
    ) {
        if recorded != replayed {
            self.out.push(Divergence {
                kind,
                name: name.to_string(),
                index,
                recorded: format!("{recorded:?}"),
                replayed: format!("{replayed:?}"),
            });
        }
    }

    fn check_f64s(&mut self, name: &str, offset: usize, recorded: &[f64], replayed: &[f64]) {
        for (i, (a, b)) in recorded.iter().zip(replayed).enumerate() {
            if a.to_bits() != b.to_bits() {
                self.out.push(Divergence {
                    kind: DivergenceKind::State,
                    name: name.to_string(),
                    index: Some(offset + i),
                    recorded: format!("{a:?}"),
                    replayed: format!("{b:?}"),
                });
            }
        }
        self.check(
            DivergenceKind::State,
            name,
            None,
            &recorded.len(),
            &replayed.len(),
        );
    }

    fn check_names<'a>(
        &mut self,
        kind: DivergenceKind,
        recorded: impl ExactSizeIterator<Item = &'a str>,
        replayed: impl ExactSizeIterator<Item = &'a str>,
    ) -> bool {
        let (rl, pl) = (recorded.len(), replayed.len());
        let mut ok = rl == pl;
        if !ok {
            self.out.push(Divergence {
                kind,
                name: "count".into(),
                index: None,
                recorded: rl.to_string(),
                replayed: pl.to_string(),
            });
        }
        for (i, (a, b)) in recorded.zip(replayed).enumerate() {
            if a != b {
                ok = false;
                self.out.push(Divergence {
                    kind,
                    name: "name".into(),
                    index: Some(i),
                    recorded: a.to_string(),
                    replayed: b.to_string(),
                });
            }
        }
        ok
    }
}

/// Compare a replayed image against a recorded one.
///
/// Returns `None` when the two describe the same executive state. State
/// values are compared by bit pattern, so the check is exact.
pub fn compare_images(
    recorded: &SnapshotImage,
    replayed: &SnapshotImage,
) -> Option<DivergenceReport> {
    if state_hash(recorded) == state_hash(replayed) && recorded == replayed {
        return None;
    }

    let mut c = Collector { out: Vec::new() };
    let h = DivergenceKind::Header;
    c.check(h, "fingerprint", None, &recorded.fingerprint, &replayed.fingerprint);
    c.check(h, "mode", None, &recorded.mode, &replayed.mode);
    c.check(h, "frame", None, &recorded.frame, &replayed.frame);
    c.check(h, "time", None, &recorded.time_tics, &replayed.time_tics);
    c.check(
        h,
        "realtime_ratio",
        None,
        &recorded.realtime_ratio.to_bits(),
        &replayed.realtime_ratio.to_bits(),
    );
    c.check(
        h,
        "pending_steps",
        None,
        &recorded.pending_steps,
        &replayed.pending_steps,
    );

    if c.check_names(
        DivergenceKind::State,
        recorded.states.iter().map(|s| s.name.as_str()),
        replayed.states.iter().map(|s| s.name.as_str()),
    ) {
        for (a, b) in recorded.states.iter().zip(&replayed.states) {
            c.check_f64s(&a.name, 0, &a.values, &b.values);
            c.check_f64s(&a.name, a.values.len(), &a.derivs, &b.derivs);
        }
    }

    if c.check_names(
        DivergenceKind::Job,
        recorded.jobs.iter().map(|j| j.name.as_str()),
        replayed.jobs.iter().map(|j| j.name.as_str()),
    ) {
        for (a, b) in recorded.jobs.iter().zip(&replayed.jobs) {
            c.check(DivergenceKind::Job, &a.name, None, a, b);
        }
    }

    if c.check_names(
        DivergenceKind::Loop,
        recorded.loops.iter().map(|l| l.name.as_str()),
        replayed.loops.iter().map(|l| l.name.as_str()),
    ) {
        for (a, b) in recorded.loops.iter().zip(&replayed.loops) {
            c.check(DivergenceKind::Loop, &a.name, None, a, b);
        }
    }

    if c.check_names(
        DivergenceKind::Event,
        recorded.events.iter().map(|e| e.name.as_str()),
        replayed.events.iter().map(|e| e.name.as_str()),
    ) {
        for (a, b) in recorded.events.iter().zip(&replayed.events) {
            c.check(DivergenceKind::Event, &a.name, None, a, b);
        }
    }

    Some(DivergenceReport {
        frame: recorded.frame,
        divergences: c.out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JobRecord, StateRecord};

    fn image() -> SnapshotImage {
        SnapshotImage {
            frame: 9,
            time_tics: 90,
            jobs: vec![JobRecord {
                name: "log".into(),
                next_call: 100,
                ..JobRecord::default()
            }],
            states: vec![StateRecord {
                name: "x".into(),
                values: vec![1.0, 2.0, 3.0],
                derivs: vec![0.0, 0.0, 0.0],
            }],
            ..SnapshotImage::default()
        }
    }

    #[test]
    fn identical_images_do_not_diverge() {
        assert!(compare_images(&image(), &image()).is_none());
    }

    #[test]
    fn state_divergence_pinpoints_element() {
        let recorded = image();
        let mut replayed = image();
        replayed.states[0].values[1] = 9.0;
        replayed.states[0].derivs[0] = -1.0;
        let report = compare_images(&recorded, &replayed).unwrap();
        assert_eq!(report.frame, 9);
        let idx: Vec<_> = report.divergences.iter().map(|d| d.index).collect();
        assert_eq!(idx, vec![Some(1), Some(3)]);
        assert_eq!(report.divergences[0].recorded, "2.0");
        assert_eq!(report.divergences[0].replayed, "9.0");
    }

    #[test]
    fn scheduling_divergence_is_reported_even_with_equal_state() {
        let recorded = image();
        let mut replayed = image();
        replayed.jobs[0].next_call = 110;
        let report = compare_images(&recorded, &replayed).unwrap();
        assert_eq!(report.divergences.len(), 1);
        assert_eq!(report.divergences[0].kind, DivergenceKind::Job);
        assert_eq!(report.divergences[0].name, "log");
    }

    #[test]
    fn renamed_state_is_an_identity_divergence() {
        let recorded = image();
        let mut replayed = image();
        replayed.states[0].name = "y".into();
        let report = compare_images(&recorded, &replayed).unwrap();
        assert_eq!(report.divergences.len(), 1);
        assert_eq!(report.divergences[0].name, "name");
        assert_eq!(report.divergences[0].index, Some(0));
    }
}
