//! Error types for packet-spectrum inference

use thiserror::Error;

/// Error type shared by all `pkt-*` crates.
///
/// Points outside the model's valid region are not errors: the likelihood
/// reports them as an infinite negative log-likelihood so that optimizers can
/// back off.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),

    /// Polynomial minimum requested for a degree without a closed form.
    #[error("minimum of a degree-{degree} polynomial on [0, 1] is not supported")]
    UnsupportedDegree {
        /// Polynomial degree (number of coefficients minus one).
        degree: usize,
    },

    /// The saddle-point equation has no positive real root.
    #[error("no positive root for X={x}, r={r}, mean={mean}, var={var}: roots {roots:?}")]
    NoPositiveRoot {
        /// Observed energy sum.
        x: f64,
        /// Negative-Binomial size parameter `n - a + 1`.
        r: f64,
        /// Mean energy per packet at the bin frequency.
        mean: f64,
        /// Energy variance per packet at the bin frequency.
        var: f64,
        /// All real roots found.
        roots: Vec<f64>,
    },

    /// Cubic equation with vanishing leading coefficient or non-finite input.
    #[error("degenerate cubic with coefficients {coefficients:?}")]
    DegenerateCubic {
        /// Coefficients in ascending order of power.
        coefficients: [f64; 4],
    },

    /// Lookup of a parameter that is not registered.
    #[error("missing parameter '{0}'")]
    MissingParameter(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
