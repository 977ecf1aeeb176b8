//! Negative-Binomial prior on the latent packet count.
//!
//! Given `n` packets observed in a bin and a Jeffreys-type prior parameter `a`,
//! the predictive distribution of the latent count `N` is Negative-Binomial
//! with size `r = n - a + 1` and success probability `1/2`:
//!
//! `ln P(N | n) = lnΓ(N + r) - lnΓ(N + 1) - lnΓ(r) - (N + r) ln 2`
//!
//! `N` is real-valued so the same expression serves the continuous
//! (medium-N) regime.

use statrs::function::gamma::{digamma, ln_gamma};
use std::f64::consts::LN_2;

/// Negative-Binomial size parameter `r = n - a + 1`.
#[inline]
pub fn size(n: u32, a: f64) -> f64 {
    f64::from(n) - a + 1.0
}

/// Log-mass of the latent count `count` given `n` observed packets.
#[inline]
pub fn logpmf_latent(count: f64, n: u32, a: f64) -> f64 {
    let r = size(n, a);
    let tmp = count + r;
    ln_gamma(tmp) - ln_gamma(count + 1.0) - ln_gamma(r) - tmp * LN_2
}

/// `∂/∂count` of [`logpmf_latent`]: `ψ(N + r) - ψ(N + 1) - ln 2`.
#[inline]
pub fn dlogpmf_latent_dcount(count: f64, n: u32, a: f64) -> f64 {
    digamma(count + size(n, a)) - digamma(count + 1.0) - LN_2
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ln_factorial(k: u64) -> f64 {
        (1..=k).map(|i| (i as f64).ln()).sum()
    }

    #[test]
    fn test_matches_factorial_mass_for_integer_size() {
        // a = 1 gives r = n, so P(N) = C(N + n - 1, N) / 2^(N + n).
        for n in 1u32..6 {
            for big_n in 0u64..12 {
                let n64 = u64::from(n);
                let direct = ln_factorial(big_n + n64 - 1)
                    - ln_factorial(big_n)
                    - ln_factorial(n64 - 1)
                    - (big_n + n64) as f64 * LN_2;
                assert_relative_eq!(
                    logpmf_latent(big_n as f64, n, 1.0),
                    direct,
                    epsilon = 1e-10
                );
            }
        }
    }

    #[test]
    fn test_mass_sums_to_one() {
        for &(n, a) in &[(0u32, 0.5), (3, 0.5), (10, 0.5), (4, 1.0)] {
            let total: f64 = (0..2000).map(|k| logpmf_latent(k as f64, n, a).exp()).sum();
            assert_relative_eq!(total, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_mean_is_size() {
        let (n, a) = (7u32, 0.5);
        let mean: f64 =
            (0..2000).map(|k| k as f64 * logpmf_latent(k as f64, n, a).exp()).sum();
        assert_relative_eq!(mean, size(n, a), epsilon = 1e-8);
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let (count, n, a) = (23.4, 20u32, 0.5);
        let h = 1e-5;
        let fd = (logpmf_latent(count + h, n, a) - logpmf_latent(count - h, n, a)) / (2.0 * h);
        assert_relative_eq!(dlogpmf_latent_dcount(count, n, a), fd, max_relative = 1e-6);
    }
}
