//! The closed set of integrator variants.

use std::fmt;

use crate::tableau::{self, Tableau};

/// Integration algorithm of a loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IntegratorKind {
    /// Explicit Euler.
    Euler,
    /// Symplectic Euler: velocities first, then positions with the new
    /// velocities. Needs second-order state layout to differ from Euler.
    EulerCromer,
    /// Heun's second-order Runge-Kutta.
    Rk2,
    /// Classical fourth-order Runge-Kutta.
    Rk4,
    /// Runge-Kutta-Gill fourth-order.
    Rkg4,
    /// Runge-Kutta-Fehlberg 4(5), adaptive.
    Rkf45,
    /// Runge-Kutta-Fehlberg 7(8), adaptive.
    Rkf78,
    /// Adams-Bashforth-Moulton fourth-order predictor-corrector,
    /// started with RK4.
    Abm4,
}

impl IntegratorKind {
    /// Every kind.
    pub const ALL: [IntegratorKind; 8] = [
        Self::Euler,
        Self::EulerCromer,
        Self::Rk2,
        Self::Rk4,
        Self::Rkg4,
        Self::Rkf45,
        Self::Rkf78,
        Self::Abm4,
    ];

    /// Lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Euler => "euler",
            Self::EulerCromer => "euler_cromer",
            Self::Rk2 => "rk2",
            Self::Rk4 => "rk4",
            Self::Rkg4 => "rkg4",
            Self::Rkf45 => "rkf45",
            Self::Rkf78 => "rkf78",
            Self::Abm4 => "abm4",
        }
    }

    /// Stable numeric tag.
    pub fn tag(self) -> u8 {
        Self::ALL.iter().position(|k| *k == self).unwrap_or(0) as u8
    }

    /// Inverse of [`tag`](Self::tag).
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }

    /// Whether the kind controls its step size against an error bound.
    pub fn is_adaptive(self) -> bool {
        matches!(self, Self::Rkf45 | Self::Rkf78)
    }

    /// Order of accuracy of the propagated solution.
    pub fn order(self) -> u32 {
        match self {
            Self::Euler | Self::EulerCromer => 1,
            Self::Rk2 => 2,
            Self::Rk4 | Self::Rkg4 | Self::Abm4 => 4,
            Self::Rkf45 => 5,
            Self::Rkf78 => 8,
        }
    }

    /// Butcher tableau for single-step Runge-Kutta kinds. The multistep
    /// kind reports the RK4 tableau it starts with.
    pub fn tableau(self) -> &'static Tableau {
        match self {
            Self::Euler | Self::EulerCromer => &tableau::EULER,
            Self::Rk2 => &tableau::HEUN,
            Self::Rk4 | Self::Abm4 => &tableau::RK4,
            Self::Rkg4 => &tableau::GILL,
            Self::Rkf45 => &tableau::RKF45,
            Self::Rkf78 => &tableau::RKF78,
        }
    }

    /// Derivative evaluations per step.
    pub fn evaluations_per_step(self) -> usize {
        match self {
            Self::Abm4 => 2,
            other => other.tableau().stages(),
        }
    }

    /// Fractional times within a step at which derivatives are evaluated.
    pub fn stage_offsets(self) -> &'static [f64] {
        match self {
            Self::Abm4 => &[0.0, 1.0],
            other => other.tableau().c,
        }
    }
}

impl fmt::Display for IntegratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for kind in IntegratorKind::ALL {
            assert_eq!(IntegratorKind::from_tag(kind.tag()), Some(kind));
        }
    }

    #[test]
    fn rk4_needs_four_evaluations_at_known_offsets() {
        assert_eq!(IntegratorKind::Rk4.evaluations_per_step(), 4);
        assert_eq!(IntegratorKind::Rk4.stage_offsets(), &[0.0, 0.5, 0.5, 1.0]);
        assert_eq!(IntegratorKind::Rkf78.evaluations_per_step(), 13);
        assert_eq!(IntegratorKind::Euler.evaluations_per_step(), 1);
    }

    #[test]
    fn only_fehlberg_kinds_are_adaptive() {
        let adaptive: Vec<_> = IntegratorKind::ALL
            .iter()
            .filter(|k| k.is_adaptive())
            .collect();
        assert_eq!(adaptive, vec![&IntegratorKind::Rkf45, &IntegratorKind::Rkf78]);
    }
}
