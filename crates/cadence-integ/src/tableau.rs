//! Butcher tableaus for the explicit Runge-Kutta strategies.

use std::f64::consts::SQRT_2;

/// Coefficients of an explicit Runge-Kutta method.
///
/// Stage `i` is evaluated at `t + c[i]·h` on `y + h·Σ a[i][j]·k[j]`;
/// the step result is `y + h·Σ b[i]·k[i]`. Embedded pairs also carry
/// `e = b_high − b_low`, whose combination estimates the local error.
#[derive(Debug)]
pub struct Tableau {
    /// Stage time fractions.
    pub c: &'static [f64],
    /// Lower-triangular stage coefficients; row `i` has `i` entries.
    pub a: &'static [&'static [f64]],
    /// Weights of the propagated solution.
    pub b: &'static [f64],
    /// Error weights, for embedded pairs.
    pub e: Option<&'static [f64]>,
    /// Order of the lower solution of an embedded pair, which sets the
    /// step-size exponent.
    pub error_order: u32,
}

impl Tableau {
    /// Number of stages.
    pub fn stages(&self) -> usize {
        self.c.len()
    }
}

/// Explicit Euler.
pub static EULER: Tableau = Tableau {
    c: &[0.0],
    a: &[&[]],
    b: &[1.0],
    e: None,
    error_order: 0,
};

/// Heun's method.
pub static HEUN: Tableau = Tableau {
    c: &[0.0, 1.0],
    a: &[&[], &[1.0]],
    b: &[0.5, 0.5],
    e: None,
    error_order: 0,
};

/// Classical fourth-order Runge-Kutta.
pub static RK4: Tableau = Tableau {
    c: &[0.0, 0.5, 0.5, 1.0],
    a: &[&[], &[0.5], &[0.0, 0.5], &[0.0, 0.0, 1.0]],
    b: &[1.0 / 6.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 6.0],
    e: None,
    error_order: 0,
};

/// Runge-Kutta-Gill.
pub static GILL: Tableau = Tableau {
    c: &[0.0, 0.5, 0.5, 1.0],
    a: &[
        &[],
        &[0.5],
        &[(SQRT_2 - 1.0) / 2.0, (2.0 - SQRT_2) / 2.0],
        &[0.0, -SQRT_2 / 2.0, 1.0 + SQRT_2 / 2.0],
    ],
    b: &[
        1.0 / 6.0,
        (2.0 - SQRT_2) / 6.0,
        (2.0 + SQRT_2) / 6.0,
        1.0 / 6.0,
    ],
    e: None,
    error_order: 0,
};

/// Runge-Kutta-Fehlberg 4(5), propagating the fifth-order solution.
pub static RKF45: Tableau = Tableau {
    c: &[0.0, 1.0 / 4.0, 3.0 / 8.0, 12.0 / 13.0, 1.0, 1.0 / 2.0],
    a: &[
        &[],
        &[1.0 / 4.0],
        &[3.0 / 32.0, 9.0 / 32.0],
        &[1932.0 / 2197.0, -7200.0 / 2197.0, 7296.0 / 2197.0],
        &[439.0 / 216.0, -8.0, 3680.0 / 513.0, -845.0 / 4104.0],
        &[
            -8.0 / 27.0,
            2.0,
            -3544.0 / 2565.0,
            1859.0 / 4104.0,
            -11.0 / 40.0,
        ],
    ],
    b: &[
        16.0 / 135.0,
        0.0,
        6656.0 / 12825.0,
        28561.0 / 56430.0,
        -9.0 / 50.0,
        2.0 / 55.0,
    ],
    e: Some(&[
        1.0 / 360.0,
        0.0,
        -128.0 / 4275.0,
        -2197.0 / 75240.0,
        1.0 / 50.0,
        2.0 / 55.0,
    ]),
    error_order: 4,
};

/// Runge-Kutta-Fehlberg 7(8), propagating the eighth-order solution.
pub static RKF78: Tableau = Tableau {
    c: &[
        0.0,
        2.0 / 27.0,
        1.0 / 9.0,
        1.0 / 6.0,
        5.0 / 12.0,
        1.0 / 2.0,
        5.0 / 6.0,
        1.0 / 6.0,
        2.0 / 3.0,
        1.0 / 3.0,
        1.0,
        0.0,
        1.0,
    ],
    a: &[
        &[],
        &[2.0 / 27.0],
        &[1.0 / 36.0, 1.0 / 12.0],
        &[1.0 / 24.0, 0.0, 1.0 / 8.0],
        &[5.0 / 12.0, 0.0, -25.0 / 16.0, 25.0 / 16.0],
        &[1.0 / 20.0, 0.0, 0.0, 1.0 / 4.0, 1.0 / 5.0],
        &[
            -25.0 / 108.0,
            0.0,
            0.0,
            125.0 / 108.0,
            -65.0 / 27.0,
            125.0 / 54.0,
        ],
        &[
            31.0 / 300.0,
            0.0,
            0.0,
            0.0,
            61.0 / 225.0,
            -2.0 / 9.0,
            13.0 / 900.0,
        ],
        &[
            2.0,
            0.0,
            0.0,
            -53.0 / 6.0,
            704.0 / 45.0,
            -107.0 / 9.0,
            67.0 / 90.0,
            3.0,
        ],
        &[
            -91.0 / 108.0,
            0.0,
            0.0,
            23.0 / 108.0,
            -976.0 / 135.0,
            311.0 / 54.0,
            -19.0 / 60.0,
            17.0 / 6.0,
            -1.0 / 12.0,
        ],
        &[
            2383.0 / 4100.0,
            0.0,
            0.0,
            -341.0 / 164.0,
            4496.0 / 1025.0,
            -301.0 / 82.0,
            2133.0 / 4100.0,
            45.0 / 82.0,
            45.0 / 164.0,
            18.0 / 41.0,
        ],
        &[
            3.0 / 205.0,
            0.0,
            0.0,
            0.0,
            0.0,
            -6.0 / 41.0,
            -3.0 / 205.0,
            -3.0 / 41.0,
            3.0 / 41.0,
            6.0 / 41.0,
            0.0,
        ],
        &[
            -1777.0 / 4100.0,
            0.0,
            0.0,
            -341.0 / 164.0,
            4496.0 / 1025.0,
            -289.0 / 82.0,
            2193.0 / 4100.0,
            51.0 / 82.0,
            33.0 / 164.0,
            12.0 / 41.0,
            0.0,
            1.0,
        ],
    ],
    b: &[
        0.0,
        0.0,
        0.0,
        0.0,
        0.0,
        34.0 / 105.0,
        9.0 / 35.0,
        9.0 / 35.0,
        9.0 / 280.0,
        9.0 / 280.0,
        0.0,
        41.0 / 840.0,
        41.0 / 840.0,
    ],
    e: Some(&[
        -41.0 / 840.0,
        0.0,
        0.0,
        0.0,
        0.0,
        0.0,
        0.0,
        0.0,
        0.0,
        0.0,
        -41.0 / 840.0,
        41.0 / 840.0,
        41.0 / 840.0,
    ]),
    error_order: 7,
};

#[cfg(test)]
mod tests {
    use super::*;

    fn all() -> [&'static Tableau; 6] {
        [&EULER, &HEUN, &RK4, &GILL, &RKF45, &RKF78]
    }

    #[test]
    fn shapes_are_consistent() {
        for tab in all() {
            let s = tab.stages();
            assert_eq!(tab.a.len(), s);
            assert_eq!(tab.b.len(), s);
            for (i, row) in tab.a.iter().enumerate() {
                assert_eq!(row.len(), i);
            }
            if let Some(e) = tab.e {
                assert_eq!(e.len(), s);
            }
        }
    }

    #[test]
    fn rows_sum_to_stage_times() {
        for tab in all() {
            for (row, c) in tab.a.iter().zip(tab.c) {
                let sum: f64 = row.iter().sum();
                assert!((sum - c).abs() < 1e-12, "row sum {sum} != c {c}");
            }
        }
    }

    #[test]
    fn weights_sum_to_one_and_error_weights_to_zero() {
        for tab in all() {
            let sum: f64 = tab.b.iter().sum();
            assert!((sum - 1.0).abs() < 1e-12);
            if let Some(e) = tab.e {
                let esum: f64 = e.iter().sum();
                assert!(esum.abs() < 1e-12);
            }
        }
    }
}
