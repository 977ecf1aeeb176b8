//! Probability building blocks for packet-spectrum inference.
//!
//! This crate hosts the numeric primitives used by the likelihood and the
//! prediction engine:
//! - polynomial curves in frequency (evaluation, minimum on `[0, 1]`)
//! - real roots of cubic equations
//! - Gamma log-density with analytic gradients
//! - the Negative-Binomial prior on the latent packet count

pub mod gamma;
pub mod neg_binomial;
pub mod poly;
