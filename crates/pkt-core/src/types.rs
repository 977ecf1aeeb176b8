//! Common data types

use serde::{Deserialize, Serialize};

/// Fit result containing the mode and its Laplace evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    /// Parameter names, aligned with `parameters`.
    pub names: Vec<String>,

    /// Best-fit parameter values
    pub parameters: Vec<f64>,

    /// Negative log-likelihood at minimum
    pub nll: f64,

    /// `log Z` of the Laplace approximation at the mode.
    pub log_evidence: f64,

    /// Convergence status
    pub converged: bool,

    /// Number of optimizer iterations
    pub n_iter: u64,

    /// Number of function evaluations
    pub n_evaluations: usize,
}

impl FitResult {
    /// Look up a best-fit value by parameter name.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.names.iter().position(|n| n == name).map(|i| self.parameters[i])
    }
}
