//! Gamma distribution utilities.

use statrs::function::gamma::{digamma, ln_gamma};

/// Unchecked Gamma log-density with `shape` and `rate` at `x`.
///
/// `shape * ln(rate) - lnΓ(shape) + (shape - 1) ln(x) - rate * x`
///
/// No validation: invalid inputs yield non-finite values, which the likelihood
/// turns into its out-of-region sentinel.
#[inline]
pub fn ln_density(x: f64, shape: f64, rate: f64) -> f64 {
    shape * rate.ln() - ln_gamma(shape) + (shape - 1.0) * x.ln() - rate * x
}

/// `∂/∂shape` of [`ln_density`]: `ln(rate) - ψ(shape) + ln(x)`.
#[inline]
pub fn dln_density_dshape(x: f64, shape: f64, rate: f64) -> f64 {
    rate.ln() - digamma(shape) + x.ln()
}

/// `∂/∂rate` of [`ln_density`]: `shape / rate - x`.
#[inline]
pub fn dln_density_drate(x: f64, shape: f64, rate: f64) -> f64 {
    shape / rate - x
}
