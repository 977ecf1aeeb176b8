//! Hierarchical Gamma model of packet energies.
//!
//! Each packet energy `e` at frequency `nu` is `Gamma(alpha(nu), beta(nu))`
//! distributed, with `alpha` and `beta` low-order polynomials in `nu`:
//!
//! `ln L = Σ_i [ α_i ln β_i - lnΓ(α_i) + (α_i - 1) ln e_i - β_i e_i ]`
//!
//! A [`Target`] optionally folds one prediction term into the likelihood: the
//! density of an energy sum `X` made of `N` packets at frequency `nu`, and for
//! [`Target::NegativeBinomialGamma`] the prior on `N` given `n` observed
//! packets. The target is an immutable part of the [`TargetedLikelihood`]
//! view, so no evaluation can observe a target left behind by another.

use crate::config::ModelConfig;
use crate::samples::{Sample, SampleStore};
use pkt_core::traits::LogDensityModel;
use pkt_core::{Error, Result};
use pkt_prob::gamma::{dln_density_drate, dln_density_dshape, ln_density};
use pkt_prob::neg_binomial::{dlogpmf_latent_dcount, logpmf_latent};
use pkt_prob::poly::polyn;
use rayon::prelude::*;

/// Name of the latent-count parameter when it is free.
pub const LATENT_COUNT: &str = "N";

/// Chunks smaller than this are not split across threads.
const MIN_CHUNK: usize = 512;

/// How the latent packet count enters a prediction term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LatentCount {
    /// `N` is held at this value.
    Fixed(f64),
    /// `N` is an extra parameter at index `orderAlpha + orderBeta`, bounded to `[1, 3n]`.
    Free,
}

/// Prediction term added to the likelihood.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Target {
    /// Plain likelihood of the samples.
    Default,
    /// Adds `ln Gamma(X | N alpha(nu), beta(nu))`.
    Gamma {
        /// Packets observed in the bin.
        n: u32,
        /// Energy sum to score.
        x: f64,
        /// Bin frequency.
        nu: f64,
        /// Latent count handling.
        count: LatentCount,
    },
    /// Adds `ln Gamma(X | N alpha(nu), beta(nu)) + ln NB(N | n, a)`.
    NegativeBinomialGamma {
        /// Packets observed in the bin.
        n: u32,
        /// Energy sum to score.
        x: f64,
        /// Bin frequency.
        nu: f64,
        /// Latent count handling.
        count: LatentCount,
    },
}

impl Target {
    /// True if the latent count is a free parameter.
    pub fn has_free_count(&self) -> bool {
        matches!(
            self,
            Target::Gamma { count: LatentCount::Free, .. }
                | Target::NegativeBinomialGamma { count: LatentCount::Free, .. }
        )
    }

    fn observed(&self) -> Option<u32> {
        match *self {
            Target::Default => None,
            Target::Gamma { n, .. } | Target::NegativeBinomialGamma { n, .. } => Some(n),
        }
    }
}

/// Upper bound of the free latent count for `n` observed packets.
pub fn latent_count_bounds(n: u32) -> (f64, f64) {
    (1.0, 3.0 * f64::from(n.max(1)))
}

/// Sample store plus model configuration.
#[derive(Debug, Clone)]
pub struct SpectrumModel {
    samples: SampleStore,
    config: ModelConfig,
}

#[derive(Clone)]
struct Acc {
    sum: f64,
    grad: Vec<f64>,
    invalid: bool,
}

impl SpectrumModel {
    /// Create a model; validates the configuration.
    pub fn new(samples: SampleStore, config: ModelConfig) -> Result<Self> {
        config.validate()?;
        if samples.is_empty() {
            return Err(Error::Validation("model needs at least one sample".to_string()));
        }
        Ok(Self { samples, config })
    }

    /// The packets.
    pub fn samples(&self) -> &SampleStore {
        &self.samples
    }

    /// The configuration.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Number of polynomial coefficients.
    pub fn n_coefficients(&self) -> usize {
        self.config.n_coefficients()
    }

    /// `alpha(nu)` for the coefficient block of `params`.
    pub fn alpha_nu(&self, params: &[f64], nu: f64) -> f64 {
        polyn(&params[..self.config.order_alpha()], nu)
    }

    /// `beta(nu)` for the coefficient block of `params`.
    pub fn beta_nu(&self, params: &[f64], nu: f64) -> f64 {
        let oa = self.config.order_alpha();
        polyn(&params[oa..oa + self.config.order_beta()], nu)
    }

    /// Borrow the model as a log-density with `target` folded in.
    pub fn with_target(&self, target: Target) -> TargetedLikelihood<'_> {
        TargetedLikelihood { model: self, target }
    }

    /// Parameter-vector length under `target`.
    pub fn dim(&self, target: &Target) -> usize {
        self.n_coefficients() + usize::from(target.has_free_count())
    }

    /// Negative log-likelihood and its gradient under `target`.
    ///
    /// Outside the valid region (a curve at or below its floor, or a
    /// non-finite term) the NLL is `+inf` and every gradient component is
    /// set to the same value. A NaN log-likelihood is reported as `+inf`
    /// too, so callers never see a NaN NLL.
    ///
    /// The per-sample sum is a parallel reduction; results can differ in the
    /// last bits between runs and thread counts.
    pub fn nll_and_grad(&self, params: &[f64], target: &Target) -> Result<(f64, Vec<f64>)> {
        let dim = self.dim(target);
        if params.len() != dim {
            return Err(Error::Validation(format!(
                "params length mismatch: expected {dim}, got {}",
                params.len()
            )));
        }

        let oa = self.config.order_alpha();
        let ob = self.config.order_beta();
        let (alpha_min, beta_min) = (self.config.alpha_min, self.config.beta_min);

        let init = || Acc { sum: 0.0, grad: vec![0.0; dim], invalid: false };
        let acc = self
            .samples
            .samples()
            .par_iter()
            .with_min_len(MIN_CHUNK)
            .fold(init, |mut acc, s: &Sample| {
                let alpha = self.alpha_nu(params, s.nu);
                let beta = self.beta_nu(params, s.nu);
                if alpha <= alpha_min || beta <= beta_min {
                    acc.invalid = true;
                }
                let term = ln_density(s.energy, alpha, beta);
                if !term.is_finite() {
                    acc.invalid = true;
                }
                acc.sum += term;
                add_curve_gradient(&mut acc.grad, oa, ob, s.energy, s.nu, alpha, beta, 1.0);
                acc
            })
            .reduce(init, |mut a, b| {
                a.sum += b.sum;
                for (ga, gb) in a.grad.iter_mut().zip(&b.grad) {
                    *ga += gb;
                }
                a.invalid |= b.invalid;
                a
            });

        let mut ll = if acc.invalid { f64::NEG_INFINITY } else { acc.sum };
        let mut grad = acc.grad;

        match *target {
            Target::Default => {}
            Target::Gamma { n, x, nu, count } | Target::NegativeBinomialGamma { n, x, nu, count } => {
                let alpha = self.alpha_nu(params, nu);
                let beta = self.beta_nu(params, nu);
                if alpha <= alpha_min || beta <= beta_min {
                    ll = f64::NEG_INFINITY;
                }
                let big_n = match count {
                    LatentCount::Fixed(v) => v,
                    LatentCount::Free => params[oa + ob],
                };

                ll += ln_density(x, big_n * alpha, beta);
                add_curve_gradient(&mut grad, oa, ob, x, nu, alpha, beta, big_n);
                if count == LatentCount::Free {
                    grad[oa + ob] += alpha * dln_density_dshape(x, big_n * alpha, beta);
                }

                if matches!(target, Target::NegativeBinomialGamma { .. }) {
                    let a = self.config.prior_a;
                    ll += logpmf_latent(big_n, n, a);
                    if count == LatentCount::Free {
                        grad[oa + ob] += dlogpmf_latent_dcount(big_n, n, a);
                    }
                }
            }
        }

        // minimize: flip the sign
        let nll = if ll.is_finite() { -ll } else { f64::INFINITY };
        if nll.is_finite() {
            for g in &mut grad {
                *g = -*g;
            }
        } else {
            grad.fill(nll);
        }
        Ok((nll, grad))
    }
}

/// Chain rule of `ln Gamma(x | count * alpha(nu), beta(nu))` onto the
/// polynomial coefficients, basis `nu^0, nu^1, ...`.
#[allow(clippy::too_many_arguments)]
#[inline]
fn add_curve_gradient(
    grad: &mut [f64],
    order_alpha: usize,
    order_beta: usize,
    x: f64,
    nu: f64,
    alpha: f64,
    beta: f64,
    count: f64,
) {
    let mut tmp = count * dln_density_dshape(x, count * alpha, beta);
    for g in &mut grad[..order_alpha] {
        *g += tmp;
        tmp *= nu;
    }
    let mut tmp = dln_density_drate(x, count * alpha, beta);
    for g in &mut grad[order_alpha..order_alpha + order_beta] {
        *g += tmp;
        tmp *= nu;
    }
}

/// [`SpectrumModel`] with a fixed prediction target, usable by the optimizer
/// and the Laplace integrator.
#[derive(Debug, Clone, Copy)]
pub struct TargetedLikelihood<'a> {
    model: &'a SpectrumModel,
    target: Target,
}

impl<'a> TargetedLikelihood<'a> {
    /// The underlying model.
    pub fn model(&self) -> &'a SpectrumModel {
        self.model
    }

    /// The folded-in target.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Index of the parameter called `name`.
    pub fn parameter_index(&self, name: &str) -> Result<usize> {
        self.parameter_names()
            .iter()
            .position(|p| p == name)
            .ok_or_else(|| Error::MissingParameter(name.to_string()))
    }
}

impl LogDensityModel for TargetedLikelihood<'_> {
    fn dim(&self) -> usize {
        self.model.dim(&self.target)
    }

    fn parameter_names(&self) -> Vec<String> {
        let mut names = self.model.config.names();
        if self.target.has_free_count() {
            names.push(LATENT_COUNT.to_string());
        }
        names
    }

    fn parameter_bounds(&self) -> Vec<(f64, f64)> {
        let mut bounds = self.model.config.bounds();
        if self.target.has_free_count() {
            bounds.push(latent_count_bounds(self.target.observed().unwrap_or(1)));
        }
        bounds
    }

    fn parameter_init(&self) -> Vec<f64> {
        let mut init = self.model.config.init();
        if self.target.has_free_count() {
            let n = f64::from(self.target.observed().unwrap_or(1));
            let (lo, hi) = latent_count_bounds(self.target.observed().unwrap_or(1));
            init.push(n.clamp(lo, hi));
        }
        init
    }

    fn nll(&self, params: &[f64]) -> Result<f64> {
        Ok(self.model.nll_and_grad(params, &self.target)?.0)
    }

    fn grad_nll(&self, params: &[f64]) -> Result<Vec<f64>> {
        Ok(self.model.nll_and_grad(params, &self.target)?.1)
    }

    fn prefer_fused_eval_grad(&self) -> bool {
        true
    }

    fn nll_grad(&self, params: &[f64]) -> Result<(f64, Vec<f64>)> {
        self.model.nll_and_grad(params, &self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParameterSpec;
    use approx::assert_relative_eq;

    fn quadratic_config() -> ModelConfig {
        ModelConfig {
            alpha: vec![
                ParameterSpec::new("alpha0", (1.0, 3.0), 1.6),
                ParameterSpec::new("alpha1", (-3.0, 3.0), -0.2),
                ParameterSpec::new("alpha2", (-3.0, 3.0), 0.1),
            ],
            beta: vec![
                ParameterSpec::new("beta0", (0.0, 100.0), 20.0),
                ParameterSpec::new("beta1", (-50.0, 50.0), -4.0),
            ],
            ..ModelConfig::default()
        }
    }

    fn model() -> SpectrumModel {
        let samples: Vec<Sample> = (0..300)
            .map(|i| {
                let u = (i as f64 + 0.5) / 300.0;
                Sample { energy: 0.02 + 0.15 * ((7.0 * u).sin() + 1.0), nu: 0.05 + 0.4 * u }
            })
            .collect();
        SpectrumModel::new(SampleStore::from_points(samples).unwrap(), quadratic_config()).unwrap()
    }

    const PARAMS: [f64; 5] = [1.7, -0.3, 0.2, 18.0, -5.0];

    fn direct_ll(m: &SpectrumModel, params: &[f64]) -> f64 {
        m.samples()
            .samples()
            .iter()
            .map(|s| {
                let a = params[0] + params[1] * s.nu + params[2] * s.nu * s.nu;
                let b = params[3] + params[4] * s.nu;
                let lg = statrs::function::gamma::ln_gamma(a);
                a * b.ln() - lg + (a - 1.0) * s.energy.ln() - b * s.energy
            })
            .sum()
    }

    fn numeric_grad(m: &SpectrumModel, params: &[f64], target: &Target) -> Vec<f64> {
        (0..params.len())
            .map(|i| {
                let h = 1e-6 * params[i].abs().max(1.0);
                let mut p = params.to_vec();
                p[i] += h;
                let fp = m.nll_and_grad(&p, target).unwrap().0;
                p[i] -= 2.0 * h;
                let fm = m.nll_and_grad(&p, target).unwrap().0;
                (fp - fm) / (2.0 * h)
            })
            .collect()
    }

    fn assert_grad_close(analytic: &[f64], numeric: &[f64]) {
        for (a, n) in analytic.iter().zip(numeric) {
            let scale = a.abs().max(n.abs()).max(1.0);
            assert!((a - n).abs() / scale < 1e-5, "analytic {a} vs numeric {n}");
        }
    }

    #[test]
    fn test_nll_matches_direct_sum() {
        let m = model();
        let (nll, _) = m.nll_and_grad(&PARAMS, &Target::Default).unwrap();
        assert_relative_eq!(nll, -direct_ll(&m, &PARAMS), max_relative = 1e-12);
    }

    #[test]
    fn test_default_gradient_matches_finite_differences() {
        let m = model();
        let (_, g) = m.nll_and_grad(&PARAMS, &Target::Default).unwrap();
        assert_grad_close(&g, &numeric_grad(&m, &PARAMS, &Target::Default));
    }

    #[test]
    fn test_gamma_target_gradients() {
        let m = model();
        let fixed = Target::Gamma { n: 12, x: 1.3, nu: 0.3, count: LatentCount::Fixed(11.0) };
        let (_, g) = m.nll_and_grad(&PARAMS, &fixed).unwrap();
        assert_grad_close(&g, &numeric_grad(&m, &PARAMS, &fixed));

        let free = Target::Gamma { n: 12, x: 1.3, nu: 0.3, count: LatentCount::Free };
        let mut p = PARAMS.to_vec();
        p.push(11.5);
        let (_, g) = m.nll_and_grad(&p, &free).unwrap();
        assert_eq!(g.len(), 6);
        assert_grad_close(&g, &numeric_grad(&m, &p, &free));
    }

    #[test]
    fn test_negative_binomial_gamma_gradients() {
        let m = model();
        let target =
            Target::NegativeBinomialGamma { n: 30, x: 3.1, nu: 0.2, count: LatentCount::Free };
        let mut p = PARAMS.to_vec();
        p.push(27.3);
        let (_, g) = m.nll_and_grad(&p, &target).unwrap();
        assert_grad_close(&g, &numeric_grad(&m, &p, &target));
    }

    #[test]
    fn test_prediction_term_value() {
        let m = model();
        let target = Target::Gamma { n: 5, x: 0.9, nu: 0.25, count: LatentCount::Fixed(4.0) };
        let (base, _) = m.nll_and_grad(&PARAMS, &Target::Default).unwrap();
        let (with, _) = m.nll_and_grad(&PARAMS, &target).unwrap();
        let alpha = m.alpha_nu(&PARAMS, 0.25);
        let beta = m.beta_nu(&PARAMS, 0.25);
        let term = ln_density(0.9, 4.0 * alpha, beta);
        assert_relative_eq!(base - with, term, max_relative = 1e-9);
    }

    #[test]
    fn test_floor_violation_is_infinite_everywhere() {
        let m = model();
        let mut p = PARAMS;
        p[0] = 0.5; // alpha below floor of 1
        let (nll, g) = m.nll_and_grad(&p, &Target::Default).unwrap();
        assert_eq!(nll, f64::INFINITY);
        assert!(g.iter().all(|&v| v == f64::INFINITY));

        let mut p = PARAMS;
        p[3] = -1.0; // beta below floor of 0
        let (nll, g) = m.nll_and_grad(&p, &Target::Default).unwrap();
        assert_eq!(nll, f64::INFINITY);
        assert!(g.iter().all(|&v| v == f64::INFINITY));

        let view = m.with_target(Target::Gamma {
            n: 4,
            x: f64::NAN,
            nu: 0.2,
            count: LatentCount::Fixed(4.0),
        });
        let (nll, g) = view.nll_grad(&PARAMS).unwrap();
        assert_eq!(nll, f64::INFINITY);
        assert!(g.iter().all(|&v| v == f64::INFINITY));
    }

    #[test]
    fn test_fused_evaluation_matches_separate_calls() {
        let m = model();
        let view = m.with_target(Target::NegativeBinomialGamma {
            n: 12,
            x: 1.4,
            nu: 0.3,
            count: LatentCount::Free,
        });
        assert!(view.prefer_fused_eval_grad());
        let mut p = PARAMS.to_vec();
        p.push(11.0);
        let (nll, g) = view.nll_grad(&p).unwrap();
        assert_relative_eq!(nll, view.nll(&p).unwrap(), max_relative = 1e-12);
        for (a, b) in g.iter().zip(view.grad_nll(&p).unwrap()) {
            assert_relative_eq!(*a, b, epsilon = 1e-9, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_target_does_not_leak_into_later_evaluations() {
        let m = model();
        let (before, g_before) = m.nll_and_grad(&PARAMS, &Target::Default).unwrap();
        {
            let view = m.with_target(Target::NegativeBinomialGamma {
                n: 30,
                x: 3.1,
                nu: 0.2,
                count: LatentCount::Fixed(28.0),
            });
            let scored = view.nll(&PARAMS).unwrap();
            assert!((scored - before).abs() > 1e-3);
        }
        let (after, g_after) = m.nll_and_grad(&PARAMS, &Target::Default).unwrap();
        assert_relative_eq!(before, after, max_relative = 1e-12);
        for (a, b) in g_before.iter().zip(&g_after) {
            assert_relative_eq!(a, b, max_relative = 1e-10);
        }
    }

    #[test]
    fn test_view_registry() {
        let m = model();
        let plain = m.with_target(Target::Default);
        assert_eq!(plain.dim(), 5);
        assert!(matches!(
            plain.parameter_index(LATENT_COUNT),
            Err(Error::MissingParameter(_))
        ));

        let free = m.with_target(Target::NegativeBinomialGamma {
            n: 10,
            x: 1.0,
            nu: 0.2,
            count: LatentCount::Free,
        });
        assert_eq!(free.dim(), 6);
        assert_eq!(free.parameter_index(LATENT_COUNT).unwrap(), 5);
        assert_eq!(free.parameter_bounds()[5], (1.0, 30.0));
        assert_eq!(free.parameter_init()[5], 10.0);
    }

    #[test]
    fn test_length_mismatch_is_an_error() {
        let m = model();
        assert!(m.nll_and_grad(&PARAMS[..4], &Target::Default).is_err());
    }
}
