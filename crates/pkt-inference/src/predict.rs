//! Posterior-predictive probability of an energy sum.
//!
//! For a frequency bin holding `n` observed packets, the probability of a
//! total energy `X` marginalises the latent packet count `N` and the curve
//! coefficients:
//!
//! `P(X | n) = Σ_N NB(N | n) ∫ L(θ) Gamma(X | N α(ν), β(ν)) dθ / ∫ L(θ) dθ`
//!
//! Three regimes evaluate this sum:
//! - small `N`: explicit walk over `N`, one refit and Laplace integral per term;
//! - medium `N`: `N` becomes a continuous parameter of a joint refit;
//! - very large `N`: closed-form saddle point, no refit.
//!
//! Evidences are kept as logarithms; only their differences are exponentiated.

use crate::laplace::laplace_log_marginal;
use crate::model::{LatentCount, SpectrumModel, Target};
use crate::optimizer::{LbfgsbOptimizer, OptimizerConfig};
use crate::saddle::laplace_1d;
use pkt_core::traits::LogDensityModel;
use pkt_core::{Error, FitResult, Result};
use pkt_prob::neg_binomial::{logpmf_latent, size};
use serde::{Deserialize, Serialize};

/// Unconstrained mode and evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedState {
    /// Best-fit coefficients.
    pub best_fit: Vec<f64>,
    /// `ln Z` of the Laplace approximation at `best_fit`.
    pub log_evidence: f64,
    /// NLL at `best_fit`.
    pub nll: f64,
    /// Whether the final mode search converged.
    pub converged: bool,
    /// Iterations of both mode searches.
    pub n_iter: u64,
    /// Objective evaluations of both mode searches.
    pub n_fev: usize,
}

/// Small-N result with walk diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmallPrediction {
    /// `P(X | n)`.
    pub value: f64,
    /// First latent count evaluated.
    pub n_start: u32,
    /// Lowest latent count evaluated.
    pub n_min: u32,
    /// Highest latent count evaluated.
    pub n_max: u32,
    /// Number of refits.
    pub n_calls: usize,
}

/// Prediction engine over a fitted [`SpectrumModel`].
///
/// All methods take `&self`: every prediction scores its hypothesis through a
/// temporary [`crate::model::TargetedLikelihood`], so calls compose in any
/// order and leave the fitted state untouched.
pub struct Predictor<'a> {
    model: &'a SpectrumModel,
    optimizer: LbfgsbOptimizer,
    fitted: FittedState,
}

impl<'a> Predictor<'a> {
    /// Fit the unconstrained mode, refit from it, then compute the evidence.
    pub fn prepare(model: &'a SpectrumModel, config: OptimizerConfig) -> Result<Self> {
        let optimizer = LbfgsbOptimizer::new(config);
        let view = model.with_target(Target::Default);
        let bounds = view.parameter_bounds();

        let first = optimizer.fit_minimum(&view)?;
        let second = optimizer.minimize(&view, &first.parameters, &bounds)?;
        if !second.converged {
            log::warn!("mode search did not converge: {}", second.message);
        }
        let laplace = laplace_log_marginal(&view, &second.parameters)?;
        log::info!(
            "mode {:?} with nll {:.6}, log evidence {:.6}",
            second.parameters,
            second.fval,
            laplace.log_marginal
        );

        let fitted = FittedState {
            best_fit: second.parameters,
            log_evidence: laplace.log_marginal,
            nll: second.fval,
            converged: second.converged,
            n_iter: first.n_iter + second.n_iter,
            n_fev: first.n_fev + second.n_fev,
        };
        Ok(Self { model, optimizer, fitted })
    }

    /// The model being predicted from.
    pub fn model(&self) -> &'a SpectrumModel {
        self.model
    }

    /// Mode and evidence.
    pub fn fitted(&self) -> &FittedState {
        &self.fitted
    }

    /// Mode and evidence as a named [`FitResult`].
    pub fn fit_result(&self) -> FitResult {
        FitResult {
            names: self.model.config().names(),
            parameters: self.fitted.best_fit.clone(),
            nll: self.fitted.nll,
            log_evidence: self.fitted.log_evidence,
            converged: self.fitted.converged,
            n_iter: self.fitted.n_iter,
            n_evaluations: self.fitted.n_fev,
        }
    }

    fn check_hypothesis(x: f64, nu: f64) -> Result<()> {
        if !(x.is_finite() && x > 0.0) {
            return Err(Error::Validation(format!("energy sum must be finite and > 0, got {x}")));
        }
        if !nu.is_finite() {
            return Err(Error::Validation(format!("frequency must be finite, got {nu}")));
        }
        Ok(())
    }

    /// Discrete sum over the latent count, walking up and down from a seed
    /// until each direction's relative contribution drops to `precision`.
    ///
    /// The seed is `max(1, round(n - a + 1))`, or `floor(x / xmean)` for a
    /// positive `xmean`. A seed whose contribution underflows to zero is a
    /// [`Error::Computation`].
    pub fn predict_small(
        &self,
        n: u32,
        x: f64,
        nu: f64,
        xmean: Option<f64>,
        precision: f64,
    ) -> Result<SmallPrediction> {
        Self::check_hypothesis(x, nu)?;
        if !(precision > 0.0 && precision < 1.0) {
            return Err(Error::Validation(format!("precision must be in (0, 1), got {precision}")));
        }

        let guess = match xmean {
            Some(m) if m > 0.0 => (x / m).floor(),
            _ => size(n, self.model.config().prior_a).round(),
        };
        let start = if guess.is_finite() { guess.clamp(1.0, f64::from(u32::MAX)) as u32 } else { 1 };

        let mut total = 0.0;
        let mut init_up = self.fitted.best_fit.clone();
        self.search_step(start, n, x, nu, precision, &mut total, &mut init_up)?;
        if !(total > 0.0) {
            return Err(Error::Computation(format!(
                "contribution at the seed N = {start} is {total}; no walk can start from it \
                 (X = {x}, n = {n})"
            )));
        }
        let mut init_down = init_up.clone();
        let mut n_calls = 1usize;

        let (mut n_up, mut n_down) = (start, start);
        let (mut go_up, mut go_down) = (true, true);
        while go_up || go_down {
            if go_up {
                n_up += 1;
                n_calls += 1;
                go_up = self.search_step(n_up, n, x, nu, precision, &mut total, &mut init_up)?;
            }
            if go_down {
                if n_down == 1 {
                    go_down = false;
                } else {
                    n_down -= 1;
                    n_calls += 1;
                    go_down =
                        self.search_step(n_down, n, x, nu, precision, &mut total, &mut init_down)?;
                }
            }
        }

        log::info!("small-N prediction from {n_calls} refits over N in [{n_down}, {n_up}]");
        Ok(SmallPrediction { value: total, n_start: start, n_min: n_down, n_max: n_up, n_calls })
    }

    /// Refit with `count` fixed and add `NB(count | n) Z_count / Z` to `total`.
    ///
    /// `init` is the warm start and receives the new mode. Returns whether the
    /// walk should continue (`latest / total > precision`).
    #[allow(clippy::too_many_arguments)]
    fn search_step(
        &self,
        count: u32,
        n: u32,
        x: f64,
        nu: f64,
        precision: f64,
        total: &mut f64,
        init: &mut Vec<f64>,
    ) -> Result<bool> {
        if count == 0 {
            return Ok(false);
        }
        let count = f64::from(count);
        let view = self.model.with_target(Target::Gamma {
            n,
            x,
            nu,
            count: LatentCount::Fixed(count),
        });
        let fit = self.optimizer.minimize(&view, init, &view.parameter_bounds())?;
        if !fit.converged {
            log::debug!("refit at N = {count} did not converge: {}", fit.message);
        }
        let laplace = laplace_log_marginal(&view, &fit.parameters)?;
        *init = fit.parameters;

        let log_nb = logpmf_latent(count, n, self.model.config().prior_a);
        let latest = (log_nb + laplace.log_marginal - self.fitted.log_evidence).exp();
        *total += latest;
        log::info!("total = {total:.6e}, P({x}|{count}) = {latest:.6e}");

        Ok(latest / *total > precision)
    }

    /// Joint refit over the coefficients and a continuous latent count
    /// `N ∈ [1, 3n]` started at `n`.
    pub fn predict_medium(&self, n: u32, x: f64, nu: f64) -> Result<f64> {
        Self::check_hypothesis(x, nu)?;
        if n == 0 {
            return Err(Error::Validation("medium-N prediction needs n > 0".to_string()));
        }

        let view = self.model.with_target(Target::NegativeBinomialGamma {
            n,
            x,
            nu,
            count: LatentCount::Free,
        });
        let bounds = view.parameter_bounds();
        let count_index = view.parameter_index(crate::model::LATENT_COUNT)?;
        let mut init = self.fitted.best_fit.clone();
        init.push(f64::from(n));
        debug_assert_eq!(count_index, init.len() - 1);

        let fit = self.optimizer.minimize(&view, &init, &bounds)?;
        if !fit.converged {
            log::warn!("joint refit did not converge: {}", fit.message);
        }
        let laplace = laplace_log_marginal(&view, &fit.parameters)?;
        let res = (laplace.log_marginal - self.fitted.log_evidence).exp();
        log::info!("medium result for X = {x}: {res:.6e} at N = {:.3}", fit.parameters[count_index]);
        Ok(res)
    }

    /// Saddle-point approximation at the fitted mode; `0` when the log-result
    /// is NaN.
    pub fn predict_very_large(&self, n: u32, x: f64, nu: f64) -> Result<f64> {
        Self::check_hypothesis(x, nu)?;
        let r = size(n, self.model.config().prior_a);
        let mode = &self.fitted.best_fit;
        let alpha = self.model.alpha_nu(mode, nu);
        let beta = self.model.beta_nu(mode, nu);
        let mean = alpha / beta;
        let var = mean / beta;

        let sp = laplace_1d(x, f64::from(n), r, mean, var)?;
        if sp.log_value.is_nan() {
            log::warn!("saddle-point result is NaN for X = {x}, n = {n}; returning 0");
            return Ok(0.0);
        }
        log::info!("very-large result for X = {x}: N* = {:.3}, ln P = {:.6}", sp.count, sp.log_value);
        Ok(sp.log_value.exp())
    }
}
