//! Bounded mode finding.
//!
//! Projected L-BFGS with an Armijo backtracking line search. Trial points are
//! clamped to the box; a trial whose NLL is not finite is rejected like any
//! other failed sufficient-decrease test, so models may signal an invalid
//! region with `+inf`.

use crate::lbfgs::LbfgsState;
use pkt_core::traits::LogDensityModel;
use pkt_core::{Error, Result};
use std::fmt;

/// Configuration for the L-BFGS-B optimizer
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Maximum number of iterations
    pub max_iter: u64,
    /// Convergence tolerance for the projected-gradient norm
    pub tol: f64,
    /// Number of corrections to approximate the inverse Hessian
    pub m: usize,
    /// Relative objective change below which the search stops
    pub tol_cost: f64,
    /// Step halvings per line search
    pub max_backtracks: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { max_iter: 1000, tol: 1e-6, m: 10, tol_cost: 1e-12, max_backtracks: 60 }
    }
}

/// Result of optimization
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Best-fit parameters
    pub parameters: Vec<f64>,
    /// Function value at minimum
    pub fval: f64,
    /// Number of iterations
    pub n_iter: u64,
    /// Number of objective evaluations.
    pub n_fev: usize,
    /// Number of gradient evaluations.
    pub n_gev: usize,
    /// Convergence status
    pub converged: bool,
    /// Termination message
    pub message: String,
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OptimizationResult(fval={:.6}, n_iter={}, n_fev={}, n_gev={}, converged={})",
            self.fval, self.n_iter, self.n_fev, self.n_gev, self.converged
        )
    }
}

/// L-BFGS-B optimizer
pub struct LbfgsbOptimizer {
    config: OptimizerConfig,
}

impl LbfgsbOptimizer {
    /// Create new optimizer with given config
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// The configuration in use.
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Minimize `model`'s NLL from `init` within `bounds`.
    ///
    /// Fails if the starting point (after clamping) has a non-finite NLL or
    /// gradient. Running out of iterations is reported through `converged`.
    pub fn minimize<M: LogDensityModel + ?Sized>(
        &self,
        model: &M,
        init: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationResult> {
        if init.len() != bounds.len() {
            return Err(Error::Validation(format!(
                "init length {} does not match bounds length {}",
                init.len(),
                bounds.len()
            )));
        }
        if let Some((i, &(lo, hi))) =
            bounds.iter().enumerate().find(|(_, (lo, hi))| lo.is_nan() || hi.is_nan() || lo > hi)
        {
            return Err(Error::Validation(format!("invalid bounds at index {i}: ({lo}, {hi})")));
        }

        let fused = model.prefer_fused_eval_grad();
        let mut n_fev = 0usize;
        let mut n_gev = 0usize;
        let mut eval = |x: &[f64]| -> Result<(f64, Vec<f64>)> {
            n_fev += 1;
            n_gev += 1;
            if fused {
                model.nll_grad(x)
            } else {
                Ok((model.nll(x)?, model.grad_nll(x)?))
            }
        };

        let x0 = LbfgsState::clamp_to_bounds(init, bounds);
        let (f0, g0) = eval(&x0)?;
        if !f0.is_finite() || g0.iter().any(|g| !g.is_finite()) {
            return Err(Error::Computation(format!(
                "non-finite objective {f0} at the starting point {x0:?}"
            )));
        }

        let cfg = &self.config;
        let mut state = LbfgsState::new(x0, f0, g0, bounds.to_vec(), cfg.m);
        let mut n_iter = 0u64;
        let mut converged = false;
        let mut message = String::from("maximum number of iterations reached");

        while n_iter < cfg.max_iter {
            let tol = cfg.tol * state.fval.abs().sqrt().max(1.0);
            if state.projected_gradient_norm() < tol {
                converged = true;
                message = "projected gradient below tolerance".to_string();
                break;
            }

            let d = state.direction();
            let slope: f64 = d.iter().zip(&state.grad).map(|(d, g)| d * g).sum();
            // First step has no curvature information: cap its length at 1.
            let mut step = if state.history_len() == 0 {
                let norm = d.iter().map(|v| v * v).sum::<f64>().sqrt();
                if norm > 1.0 { 1.0 / norm } else { 1.0 }
            } else {
                1.0
            };

            let mut accepted = None;
            for _ in 0..cfg.max_backtracks {
                let x = state.trial(&d, step);
                let (f, g) = eval(&x)?;
                let decrease = f <= state.fval + 1e-4 * step * slope;
                if f.is_finite() && g.iter().all(|v| v.is_finite()) && decrease {
                    accepted = Some((x, f, g));
                    break;
                }
                step *= 0.5;
            }

            n_iter += 1;
            let Some((x, f, g)) = accepted else {
                if state.history_len() > 0 {
                    // stale curvature: retry along the projected gradient
                    state.reset_history();
                    continue;
                }
                converged = true;
                message = "line search exhausted at numerical precision".to_string();
                break;
            };

            let f_prev = state.fval;
            state.accept(x, f, g);
            let rel = (f_prev - f).abs() / f_prev.abs().max(f.abs()).max(1.0);
            if rel < cfg.tol_cost {
                converged = true;
                message = "relative objective change below tolerance".to_string();
                break;
            }
        }

        if !converged {
            log::warn!("L-BFGS stopped after {n_iter} iterations without converging");
        }

        Ok(OptimizationResult {
            parameters: state.x,
            fval: state.fval,
            n_iter,
            n_fev,
            n_gev,
            converged,
            message,
        })
    }

    /// Minimize from the model's own initial values and bounds.
    pub fn fit_minimum<M: LogDensityModel + ?Sized>(&self, model: &M) -> Result<OptimizationResult> {
        self.minimize(model, &model.parameter_init(), &model.parameter_bounds())
    }
}

impl Default for LbfgsbOptimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}
