//! Model configuration.
//!
//! The number of alpha/beta coefficients fixes the polynomial orders of the
//! shape and rate curves. Configurations round-trip through JSON so that the
//! CLI can load them from disk.

use pkt_core::{Error, Result};
use pkt_prob::poly::min_polyn;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One named polynomial coefficient with its box bounds and starting value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Parameter name (e.g. `alpha0`).
    pub name: String,
    /// Lower and upper bound.
    pub bounds: (f64, f64),
    /// Starting value for the first mode search.
    pub init: f64,
}

impl ParameterSpec {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, bounds: (f64, f64), init: f64) -> Self {
        Self { name: name.into(), bounds, init }
    }
}

/// Deterministic rescaling applied to raw packets when a store is loaded.
///
/// Energies become `1 - e / ((1 + energy_margin) * max_e)`, frequencies are
/// divided by `frequency_scale`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rescaling {
    /// Relative margin above the largest energy.
    pub energy_margin: f64,
    /// Fixed frequency divisor. Must not depend on the data: outliers at very
    /// large frequency would otherwise bias the curves.
    pub frequency_scale: f64,
}

impl Default for Rescaling {
    fn default() -> Self {
        Self { energy_margin: 1e-6, frequency_scale: 1e15 }
    }
}

/// Polynomial orders, bounds, floors and prior settings of the spectrum model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Coefficients of the shape curve `alpha(nu)`, ascending powers.
    pub alpha: Vec<ParameterSpec>,
    /// Coefficients of the rate curve `beta(nu)`, ascending powers.
    pub beta: Vec<ParameterSpec>,
    /// `alpha(nu)` must stay strictly above this floor.
    pub alpha_min: f64,
    /// `beta(nu)` must stay strictly above this floor.
    pub beta_min: f64,
    /// Parameter `a` of the Negative-Binomial latent-count prior.
    pub prior_a: f64,
    /// Raw-data rescaling.
    pub rescaling: Rescaling,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            alpha: vec![ParameterSpec::new("alpha0", (1.0, 2.0), 1.5)],
            beta: vec![ParameterSpec::new("beta0", (0.0, 100.0), 60.0)],
            alpha_min: 1.0,
            beta_min: 0.0,
            prior_a: 0.5,
            rescaling: Rescaling::default(),
        }
    }
}

impl ModelConfig {
    /// Parse a JSON configuration and validate it.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration from disk and validate it.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Number of shape coefficients.
    pub fn order_alpha(&self) -> usize {
        self.alpha.len()
    }

    /// Number of rate coefficients.
    pub fn order_beta(&self) -> usize {
        self.beta.len()
    }

    /// Number of polynomial coefficients (without the latent count).
    pub fn n_coefficients(&self) -> usize {
        self.alpha.len() + self.beta.len()
    }

    fn specs(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.alpha.iter().chain(self.beta.iter())
    }

    /// Coefficient names in parameter-vector order.
    pub fn names(&self) -> Vec<String> {
        self.specs().map(|p| p.name.clone()).collect()
    }

    /// Coefficient bounds in parameter-vector order.
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        self.specs().map(|p| p.bounds).collect()
    }

    /// Starting values in parameter-vector order.
    pub fn init(&self) -> Vec<f64> {
        self.specs().map(|p| p.init).collect()
    }

    /// Check orders, bounds and that the starting curves clear their floors on `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if self.alpha.is_empty() || self.beta.is_empty() {
            return Err(Error::Validation(
                "model needs at least one alpha and one beta coefficient".to_string(),
            ));
        }
        for p in self.specs() {
            let (lo, hi) = p.bounds;
            if lo.is_nan() || hi.is_nan() || lo >= hi {
                return Err(Error::Validation(format!(
                    "invalid bounds for '{}': expected low < high, got ({lo}, {hi})",
                    p.name
                )));
            }
            if !(lo..=hi).contains(&p.init) {
                return Err(Error::Validation(format!(
                    "init {} of '{}' outside bounds ({lo}, {hi})",
                    p.init, p.name
                )));
            }
        }
        // NB size n - a + 1 must stay positive down to n = 0.
        if !(self.prior_a < 1.0) || !self.prior_a.is_finite() {
            return Err(Error::Validation(format!(
                "prior_a must be finite and < 1, got {}",
                self.prior_a
            )));
        }
        let r = &self.rescaling;
        // A zero margin maps the largest energy to exactly 0.
        if !(r.energy_margin > 0.0) || !(r.frequency_scale > 0.0) {
            return Err(Error::Validation(format!("invalid rescaling {r:?}")));
        }

        let init = self.init();
        let (alpha, beta) = init.split_at(self.order_alpha());
        for (label, coeffs, floor) in
            [("alpha", alpha, self.alpha_min), ("beta", beta, self.beta_min)]
        {
            match min_polyn(coeffs) {
                Ok(m) if m <= floor => {
                    return Err(Error::Validation(format!(
                        "initial {label} curve reaches {m} <= floor {floor} on [0, 1]"
                    )));
                }
                Ok(_) => {}
                Err(Error::UnsupportedDegree { degree }) => {
                    log::debug!("skipping floor check of degree-{degree} {label} curve");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let c = ModelConfig::default();
        c.validate().unwrap();
        assert_eq!(c.order_alpha(), 1);
        assert_eq!(c.order_beta(), 1);
        assert_eq!(c.names(), vec!["alpha0", "beta0"]);
        assert_eq!(c.init(), vec![1.5, 60.0]);
    }

    #[test]
    fn test_json_defaults_fill_missing_fields() {
        let c = ModelConfig::from_json_str(r#"{ "prior_a": 0.0 }"#).unwrap();
        assert_eq!(c.prior_a, 0.0);
        assert_eq!(c.alpha_min, 1.0);
        assert_eq!(c.rescaling.frequency_scale, 1e15);
    }

    #[test]
    fn test_json_quadratic_alpha() {
        let json = r#"{
            "alpha": [
                { "name": "alpha0", "bounds": [1.0, 2.0], "init": 1.6 },
                { "name": "alpha1", "bounds": [-3.0, 3.0], "init": -0.17 },
                { "name": "alpha2", "bounds": [-10.0, 10.0], "init": -0.05 }
            ]
        }"#;
        let c = ModelConfig::from_json_str(json).unwrap();
        assert_eq!(c.order_alpha(), 3);
        assert_eq!(c.n_coefficients(), 4);
    }

    #[test]
    fn test_rejects_init_below_floor() {
        let mut c = ModelConfig::default();
        c.alpha = vec![
            ParameterSpec::new("alpha0", (1.0, 2.0), 1.2),
            ParameterSpec::new("alpha1", (-3.0, 3.0), -0.5),
        ];
        // alpha(1) = 0.7 < 1
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_cubic_curve_skips_floor_check() {
        let mut c = ModelConfig::default();
        c.alpha = vec![
            ParameterSpec::new("alpha0", (1.0, 2.0), 1.6),
            ParameterSpec::new("alpha1", (-3.0, 3.0), 0.0),
            ParameterSpec::new("alpha2", (-3.0, 3.0), 0.0),
            ParameterSpec::new("alpha3", (-3.0, 3.0), 0.0),
        ];
        c.validate().unwrap();
    }

    #[test]
    fn test_rejects_bad_bounds() {
        let mut c = ModelConfig::default();
        c.beta[0].bounds = (100.0, 0.0);
        assert!(c.validate().is_err());
        let mut c = ModelConfig::default();
        c.beta[0].init = 200.0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_rejects_prior_leaving_no_positive_size() {
        let c = ModelConfig { prior_a: 1.0, ..ModelConfig::default() };
        assert!(matches!(c.validate(), Err(Error::Validation(_))));
        let c = ModelConfig { prior_a: f64::NEG_INFINITY, ..ModelConfig::default() };
        assert!(c.validate().is_err());
        let c = ModelConfig { prior_a: -2.0, ..ModelConfig::default() };
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_energy_margin() {
        let mut c = ModelConfig::default();
        c.rescaling.energy_margin = 0.0;
        assert!(matches!(c.validate(), Err(Error::Validation(_))));
        c.rescaling.energy_margin = 1e-9;
        assert!(c.validate().is_ok());
    }
}
