//! # pkt-inference
//!
//! Inference for Gamma packet spectra.
//!
//! This crate provides:
//! - Packet loading, rescaling and binning ([`SampleStore`])
//! - The hierarchical Gamma likelihood with analytic gradients ([`SpectrumModel`])
//! - Bounded L-BFGS mode finding and Laplace evidence
//! - Posterior-predictive probabilities of binned energy sums ([`Predictor`])
//!
//! ## Architecture
//!
//! The optimizer and the Laplace integrator only see the
//! [`pkt_core::LogDensityModel`] trait. A prediction hypothesis is an explicit
//! [`Target`] value carried by the likelihood view it is scored with.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Model configuration (polynomial orders, bounds, floors, prior).
pub mod config;
/// Tabular packet sources.
pub mod data;
/// Laplace approximation of the evidence.
pub mod laplace;
pub(crate) mod lbfgs;
/// Hierarchical Gamma likelihood and prediction targets.
pub mod model;
/// Bounded L-BFGS optimizer.
pub mod optimizer;
/// Posterior-predictive engine.
pub mod predict;
/// Saddle-point approximation for very large latent counts.
pub mod saddle;
/// Frequency-sorted packet store.
pub mod samples;

pub use config::{ModelConfig, ParameterSpec, Rescaling};
pub use data::{DataSource, JsonTable};
pub use laplace::{LaplaceResult, laplace_log_marginal};
pub use model::{LatentCount, SpectrumModel, Target, TargetedLikelihood};
pub use optimizer::{LbfgsbOptimizer, OptimizationResult, OptimizerConfig};
pub use predict::{FittedState, Predictor, SmallPrediction};
pub use samples::{Sample, SampleStore};
