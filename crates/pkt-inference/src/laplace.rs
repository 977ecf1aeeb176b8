//! Laplace approximation of the evidence.
//!
//! `Z = ∫ exp(-NLL(x)) dx ≈ exp(-NLL(x_hat)) * (2π)^(d/2) * |H|^(-1/2)`
//!
//! where `H` is the Hessian of `NLL` at the mode `x_hat`.

use nalgebra::DMatrix;
use pkt_core::traits::LogDensityModel;
use pkt_core::{Error, Result};

/// Result of a Laplace approximation at a given mode.
#[derive(Debug, Clone)]
pub struct LaplaceResult {
    /// Dimension of the parameter vector.
    pub dim: usize,
    /// NLL evaluated at the mode.
    pub nll_at_mode: f64,
    /// `log |H|` where `H` is the Hessian of NLL at the mode.
    pub log_det_hessian: f64,
    /// `log Z` under the Laplace approximation.
    pub log_marginal: f64,
}

fn finite(g: &[f64]) -> bool {
    g.iter().all(|v| v.is_finite())
}

/// Central differences of the analytic gradient; one-sided where a step
/// leaves the valid region (modes often sit close to a curve floor).
fn compute_hessian<M: LogDensityModel + ?Sized>(
    model: &M,
    params: &[f64],
) -> Result<DMatrix<f64>> {
    let n = params.len();
    let g0 = model.grad_nll(params)?;
    let mut hessian = DMatrix::zeros(n, n);
    for j in 0..n {
        let eps = 1e-4 * params[j].abs().max(1.0);

        let mut params_plus = params.to_vec();
        params_plus[j] += eps;
        let grad_plus = model.grad_nll(&params_plus)?;

        let mut params_minus = params.to_vec();
        params_minus[j] -= eps;
        let grad_minus = model.grad_nll(&params_minus)?;

        let column: Vec<f64> = match (finite(&grad_plus), finite(&grad_minus)) {
            (true, true) => {
                grad_plus.iter().zip(&grad_minus).map(|(p, m)| (p - m) / (2.0 * eps)).collect()
            }
            (true, false) => grad_plus.iter().zip(&g0).map(|(p, c)| (p - c) / eps).collect(),
            (false, true) => g0.iter().zip(&grad_minus).map(|(c, m)| (c - m) / eps).collect(),
            (false, false) => {
                return Err(Error::Computation(format!(
                    "gradient not finite on either side of parameter {j} at the mode"
                )));
            }
        };
        for (i, v) in column.into_iter().enumerate() {
            hessian[(i, j)] = v;
        }
    }

    let ht = hessian.transpose();
    Ok((&hessian + &ht) * 0.5)
}

/// `log |H|` via Cholesky, retrying with a diagonal jitter of up to 1% of the
/// largest diagonal entry.
fn log_det_pd(h: &DMatrix<f64>) -> Result<f64> {
    let n = h.nrows();
    if n != h.ncols() {
        return Err(Error::Validation("hessian must be square".to_string()));
    }

    let max_abs_diag = (0..n).map(|i| h[(i, i)].abs()).fold(0.0_f64, f64::max).max(1.0);

    let mut jitter = 1e-10 * max_abs_diag;
    for attempt in 0..10 {
        let mut h_try = h.clone();
        if attempt > 0 {
            for i in 0..n {
                h_try[(i, i)] += jitter;
            }
            log::debug!("Cholesky retry {attempt} with jitter {jitter:.3e}");
        }

        if let Some(chol) = nalgebra::linalg::Cholesky::new(h_try) {
            let l = chol.l();
            let mut sum = 0.0;
            for i in 0..l.nrows() {
                let d = l[(i, i)];
                if !d.is_finite() || d <= 0.0 {
                    return Err(Error::Computation(
                        "non-finite/negative Cholesky diagonal".to_string(),
                    ));
                }
                sum += d.ln();
            }
            return Ok(2.0 * sum);
        }

        jitter *= 10.0;
    }

    Err(Error::Computation("Laplace requires a positive-definite Hessian".to_string()))
}

/// Compute a Laplace approximation at `params_mode`.
pub fn laplace_log_marginal<M: LogDensityModel + ?Sized>(
    model: &M,
    params_mode: &[f64],
) -> Result<LaplaceResult> {
    if params_mode.len() != model.dim() {
        return Err(Error::Validation("params length mismatch".to_string()));
    }

    let nll = model.nll(params_mode)?;
    if !nll.is_finite() {
        return Err(Error::Computation("nll at mode must be finite".to_string()));
    }

    let h = compute_hessian(model, params_mode)?;
    let log_det = log_det_pd(&h)?;

    let d = params_mode.len() as f64;
    let log2pi = (2.0 * std::f64::consts::PI).ln();
    let log_marginal = -nll + 0.5 * d * log2pi - 0.5 * log_det;

    Ok(LaplaceResult { dim: params_mode.len(), nll_at_mode: nll, log_det_hessian: log_det, log_marginal })
}
