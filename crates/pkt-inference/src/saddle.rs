//! Continuous saddle-point approximation for a very large latent count.
//!
//! With `N` treated as continuous, the Negative-Binomial prior is replaced by
//! a Gaussian of variance `2r` centred on the observed count `n`, and the sum
//! of `N` Gamma energies by a Gaussian of mean `N * mean` and variance
//! `N * var`:
//!
//! `ln f(N) = -ln 2π - ½ ln(2 r N var) - (N - n)² / 4r - (X - N mean)² / (2 N var)`
//!
//! The stationary point solves the cubic
//! `N³ + r (mean²/var - 1) N² + r N - r X²/var = 0`, and a one-dimensional
//! Laplace approximation around it integrates out `N`.

use pkt_core::{Error, Result};
use pkt_prob::poly::solve_cubic;
use std::f64::consts::PI;

/// Surrogate log-density of `x` at the continuous count `count`.
pub fn log_surrogate(x: f64, count: f64, n: f64, r: f64, mean: f64, var: f64) -> f64 {
    let dn = count - n;
    let dx = x - count * mean;
    -(2.0 * PI).ln()
        - 0.5 * (2.0 * r * count * var).ln()
        - 0.5 * dn * dn / (2.0 * r)
        - 0.5 * dx * dx / (count * var)
}

/// `-d²/dN²` of [`log_surrogate`].
pub fn saddle_hessian(x: f64, count: f64, r: f64, var: f64) -> f64 {
    (-1.0 / (count * count) + 1.0 / r + 2.0 * x * x / (count * count * count * var)) / 2.0
}

/// Ascending-power coefficients of the stationary-point cubic.
pub fn saddle_cubic(x: f64, r: f64, mean: f64, var: f64) -> [f64; 4] {
    [-r * x * x / var, r, r * (mean * mean / var - 1.0), 1.0]
}

/// Positive stationary point of the surrogate.
///
/// A single positive root is returned as is. With several, the one with the
/// largest surrogate density wins and a warning is logged.
pub fn solve_saddle_point(x: f64, n: f64, r: f64, mean: f64, var: f64) -> Result<f64> {
    let roots = solve_cubic(saddle_cubic(x, r, mean, var))?;
    let positive: Vec<f64> = roots.iter().copied().filter(|&z| z > 0.0).collect();

    match positive.as_slice() {
        [] => Err(Error::NoPositiveRoot { x, r, mean, var, roots }),
        [only] => Ok(*only),
        _ => {
            log::warn!("{} positive saddle points {positive:?}, keeping the densest", positive.len());
            let best = positive
                .iter()
                .map(|&z| (z, log_surrogate(x, z, n, r, mean, var)))
                .filter(|(_, f)| !f.is_nan())
                .max_by(|a, b| a.1.total_cmp(&b.1));
            match best {
                Some((z, _)) => Ok(z),
                None => {
                    log::warn!("surrogate is NaN at every positive root, using {}", positive[0]);
                    Ok(positive[0])
                }
            }
        }
    }
}

/// Saddle point and `ln ∫ f(N) dN` around it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SaddlePoint {
    /// Stationary count `N*`.
    pub count: f64,
    /// `ln f(N*) + ½ ln(2π / h(N*))`.
    pub log_value: f64,
}

/// One-dimensional Laplace approximation over the continuous count.
pub fn laplace_1d(x: f64, n: f64, r: f64, mean: f64, var: f64) -> Result<SaddlePoint> {
    let count = solve_saddle_point(x, n, r, mean, var)?;
    let h = saddle_hessian(x, count, r, var);
    let log_value = log_surrogate(x, count, n, r, mean, var) + 0.5 * (2.0 * PI / h).ln();
    Ok(SaddlePoint { count, log_value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_hessian_matches_second_difference() {
        let (x, n, r, mean, var) = (45.0, 40.0, 39.5, 1.1, 0.4);
        for count in [20.0, 41.3, 70.0] {
            let h = 1e-3;
            let f = |c: f64| log_surrogate(x, c, n, r, mean, var);
            let numeric = -(f(count + h) - 2.0 * f(count) + f(count - h)) / (h * h);
            assert_relative_eq!(saddle_hessian(x, count, r, var), numeric, max_relative = 1e-5);
        }
    }

    #[test]
    fn test_root_is_a_cubic_root() {
        let (x, n, r, mean, var) = (120.0, 100.0, 99.5, 1.2, 0.6);
        let z = solve_saddle_point(x, n, r, mean, var).unwrap();
        assert!(z > 0.0);
        let [c0, c1, c2, c3] = saddle_cubic(x, r, mean, var);
        let residual = c0 + z * (c1 + z * (c2 + z * c3));
        assert!(residual.abs() < 1e-8 * c0.abs());
        // close to X / mean when the energy term dominates
        assert_relative_eq!(z, x / mean, max_relative = 0.1);
    }

    #[test]
    fn test_negative_size_has_no_positive_root() {
        // x^3 - 0.5 x^2 - 0.5 x + 1 stays positive on x > 0
        let err = solve_saddle_point(1.0, 0.0, -0.5, 1.0, 0.5).unwrap_err();
        assert!(matches!(err, Error::NoPositiveRoot { .. }));
    }

    #[test]
    fn test_laplace_1d_matches_quadrature() {
        let (x, n, r, mean, var) = (300.0, 250.0, 249.5, 1.2, 0.8);
        let sp = laplace_1d(x, n, r, mean, var).unwrap();
        let step = 0.01;
        let integral: f64 = (1..100_000)
            .map(|i| (log_surrogate(x, i as f64 * step, n, r, mean, var)).exp() * step)
            .sum();
        assert_relative_eq!(sp.log_value, integral.ln(), epsilon = 0.02);
    }
}
