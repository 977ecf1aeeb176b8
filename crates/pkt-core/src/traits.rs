//! Core traits
//!
//! High-level inference logic (mode finding, Laplace evidence, prediction)
//! depends only on [`LogDensityModel`], never on a concrete likelihood.

use crate::Result;

/// Model interface for mode finding and Laplace integration.
///
/// NLL values may be `+inf` for parameter points outside the model's valid
/// region. Implementations must then report a gradient filled with the same
/// non-finite value.
pub trait LogDensityModel: Send + Sync {
    /// Number of parameters.
    fn dim(&self) -> usize;

    /// Parameter names (stable order).
    fn parameter_names(&self) -> Vec<String>;

    /// Parameter bounds (min, max) (stable order).
    fn parameter_bounds(&self) -> Vec<(f64, f64)>;

    /// Suggested initial values (stable order).
    fn parameter_init(&self) -> Vec<f64>;

    /// Negative log-likelihood.
    fn nll(&self, params: &[f64]) -> Result<f64>;

    /// Gradient of NLL.
    fn grad_nll(&self, params: &[f64]) -> Result<Vec<f64>>;

    /// Hint: prefer evaluating NLL and gradient together in one call.
    ///
    /// Likelihoods that reduce over many samples compute both in a single pass.
    /// When this returns `true` the optimizer calls [`Self::nll_grad`] for
    /// every trial point.
    fn prefer_fused_eval_grad(&self) -> bool {
        false
    }

    /// Compute NLL and gradient together.
    ///
    /// The default implementation calls [`Self::nll`] and [`Self::grad_nll`].
    fn nll_grad(&self, params: &[f64]) -> Result<(f64, Vec<f64>)> {
        Ok((self.nll(params)?, self.grad_nll(params)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyModel;

    impl LogDensityModel for DummyModel {
        fn dim(&self) -> usize {
            2
        }

        fn parameter_names(&self) -> Vec<String> {
            vec!["a".to_string(), "b".to_string()]
        }

        fn parameter_bounds(&self) -> Vec<(f64, f64)> {
            vec![(0.0, 1.0), (-1.0, 1.0)]
        }

        fn parameter_init(&self) -> Vec<f64> {
            vec![0.5, 0.0]
        }

        fn nll(&self, params: &[f64]) -> Result<f64> {
            Ok(params.iter().map(|&x| x * x).sum())
        }

        fn grad_nll(&self, params: &[f64]) -> Result<Vec<f64>> {
            Ok(params.iter().map(|&x| 2.0 * x).collect())
        }
    }

    #[test]
    fn test_default_fused_matches_separate_calls() {
        let m = DummyModel;
        let (f, g) = m.nll_grad(&[1.0, -2.0]).unwrap();
        assert_eq!(f, 5.0);
        assert_eq!(g, vec![2.0, -4.0]);
        assert!(!m.prefer_fused_eval_grad());
    }

    #[test]
    fn test_usable_as_trait_object() {
        let m: &dyn LogDensityModel = &DummyModel;
        assert_eq!(m.dim(), m.parameter_names().len());
        assert!((m.nll(&[2.0, 3.0]).unwrap() - 13.0).abs() < 1e-12);
    }
}
